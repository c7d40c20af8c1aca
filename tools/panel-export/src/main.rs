use clap::{ArgAction, Parser, ValueHint};
use st_panel::config::{
    DEFAULT_BASE_COLS, DEFAULT_BASE_ROWS, DEFAULT_BASIS_SUFFIX, DEFAULT_INPUT_ROOT,
    DEFAULT_OUTPUT_ROOT, DEFAULT_SAMPLES,
};
use st_panel::signals::DEFAULT_DIRECTIONS;
use st_panel::source::{DEFAULT_ANALYSIS_SUBDIR, DEFAULT_SAMPLES_SUBDIR};
use st_panel::telemetry::{self, InitError};
use st_panel::{Confirmation, ExportConfig, ExportOutcome, ExportPlan, FsArraySource, SignalSet};
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

type DynError = Box<dyn Error>;

type Result<T> = std::result::Result<T, DynError>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Export recorded agent introspection data as a static panel dataset"
)]
struct Cli {
    /// Number of recorded samples to export, starting at sample_00000
    #[arg(long, default_value_t = DEFAULT_SAMPLES)]
    samples: usize,

    /// Root of the training output tree holding the recorded samples and analysis
    #[arg(
        long,
        env = "ST_PANEL_INPUT",
        default_value = DEFAULT_INPUT_ROOT,
        value_hint = ValueHint::DirPath
    )]
    input_directory: PathBuf,

    /// Destination folder; deleted and replaced by the export
    #[arg(
        long,
        env = "ST_PANEL_OUTPUT",
        default_value = DEFAULT_OUTPUT_ROOT,
        value_hint = ValueHint::DirPath
    )]
    output_directory: PathBuf,

    /// Suffix selecting the precomputed basis (pcomponents_<suffix>.npy, ...)
    #[arg(long, default_value = DEFAULT_BASIS_SUFFIX)]
    basis_suffix: String,

    /// Comma-separated 1-based PC directions with recorded gradients and saliency
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_DIRECTIONS)]
    directions: Vec<usize>,

    /// Maximum rows of global PC coordinates kept in the document
    #[arg(long, default_value_t = DEFAULT_BASE_ROWS)]
    base_rows: usize,

    /// Maximum columns of global PC coordinates kept in the document
    #[arg(long, default_value_t = DEFAULT_BASE_COLS)]
    base_cols: usize,

    /// Worker threads exporting samples in parallel
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    /// Sample directory relative to the input root
    #[arg(long, default_value = DEFAULT_SAMPLES_SUBDIR)]
    samples_subdir: PathBuf,

    /// Analysis directory relative to the input root
    #[arg(long, default_value = DEFAULT_ANALYSIS_SUBDIR)]
    analysis_subdir: PathBuf,

    /// Replace the output folder without asking
    #[arg(short, long, action = ArgAction::SetTrue)]
    yes: bool,
}

impl Cli {
    fn export_config(&self) -> ExportConfig {
        ExportConfig {
            samples: self.samples,
            input_root: self.input_directory.clone(),
            output_root: self.output_directory.clone(),
            basis_suffix: self.basis_suffix.clone(),
            signals: SignalSet::with_directions(self.directions.iter().copied()),
            base_rows: self.base_rows,
            base_cols: self.base_cols,
            jobs: self.jobs,
        }
    }
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        telemetry::flush_tracing();
        std::process::exit(1);
    }
    telemetry::flush_tracing();
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    match telemetry::init_tracing() {
        Ok(()) | Err(InitError::AlreadyInitialised) => {}
        Err(err) => eprintln!("warning: failed to initialise tracing subscriber: {err}"),
    }

    let config = cli.export_config();
    debug!(config = %serde_json::to_string(&config)?, "resolved configuration");
    let source =
        FsArraySource::with_layout(&config.input_root, &cli.samples_subdir, &cli.analysis_subdir);
    let plan = ExportPlan::prepare(config, source)?;

    println!("Output folder: {}", plan.output_root().display());
    println!("This folder will be deleted and replaced with exported data.");
    let confirmation = if cli.yes {
        Confirmation::Granted
    } else {
        prompt("Continue? y/[n]: ")?
    };

    match plan.commit(confirmation)? {
        ExportOutcome::Completed(summary) => {
            debug!(document = %summary.document.display(), samples = summary.samples, "written");
            println!("Done!");
        }
        ExportOutcome::Cancelled => println!("Process cancelled!"),
    }
    Ok(())
}

fn prompt(question: &str) -> Result<Confirmation> {
    let mut stdout = io::stdout();
    write!(stdout, "{question}")?;
    stdout.flush()?;
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer)? == 0 {
        warn!("no answer on stdin; treating as declined");
    }
    Ok(Confirmation::from_answer(&answer))
}
