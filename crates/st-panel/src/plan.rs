// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Two-phase export: [`ExportPlan::prepare`] validates inputs without touching
//! the output tree, [`ExportPlan::commit`] replaces it.
//!
//! Commit stages everything in a sibling temporary directory and only swaps it
//! into place once every sample and the document have been written. A failed
//! commit leaves the previous output root as it was.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::basis::{matrix, PcBasis};
use crate::config::ExportConfig;
use crate::document::{AggregateDocument, LoadingsRecord, PANEL_DATA_FILE};
use crate::error::{PanelError, PanelResult};
use crate::exporter::Exporter;
use crate::signals::sample_id;
use crate::source::ArraySource;

const STAGING_PREFIX: &str = ".st-panel-staging-";

/// Caller's answer to "replace the output root?".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Granted,
    Denied,
}

impl Confirmation {
    /// `y` / `yes` in any case confirms; anything else declines.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Confirmation::Granted,
            _ => Confirmation::Denied,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSummary {
    pub output_root: PathBuf,
    pub document: PathBuf,
    pub samples: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    Cancelled,
    Completed(ExportSummary),
}

/// A validated export waiting for confirmation.
pub struct ExportPlan<S: ArraySource> {
    config: ExportConfig,
    source: S,
    basis: PcBasis,
    global_loadings: Array2<f64>,
    sample_ids: Vec<String>,
}

impl<S: ArraySource> ExportPlan<S> {
    /// Loads and checks the run-wide artefacts. Reads no sample data and
    /// writes nothing.
    pub fn prepare(mut config: ExportConfig, source: S) -> PanelResult<Self> {
        config.validate()?;
        config.normalise_output_root()?;
        let basis = PcBasis::load(&source, &config.basis_suffix)?;
        let global_file = format!("hx_pca_{}.npy", config.basis_suffix);
        let global_loadings = matrix(&source.load_analysis(&global_file)?, &global_file)?;
        let sample_ids = (0..config.samples).map(sample_id).collect();
        info!(
            samples = config.samples,
            components = basis.num_components(),
            dim = basis.dim(),
            output = %config.output_root.display(),
            "export plan prepared"
        );
        Ok(Self {
            config,
            source,
            basis,
            global_loadings,
            sample_ids,
        })
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn output_root(&self) -> &Path {
        &self.config.output_root
    }

    /// Replaces the output root with a fresh export when `confirmation` is
    /// [`Confirmation::Granted`].
    pub fn commit(&self, confirmation: Confirmation) -> PanelResult<ExportOutcome> {
        if confirmation == Confirmation::Denied {
            warn!(output = %self.output_root().display(), "export cancelled");
            return Ok(ExportOutcome::Cancelled);
        }

        let parent = match self.output_root().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if parent.starts_with(self.output_root()) {
            return Err(PanelError::Config {
                reason: format!(
                    "staging area {} lies inside output root {}",
                    parent.display(),
                    self.output_root().display()
                ),
            });
        }
        fs::create_dir_all(&parent).map_err(|err| PanelError::io(&parent, err))?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&parent)
            .map_err(|err| PanelError::io(&parent, err))?;

        // dropping `staging` on any error below removes the partial export
        let document = self.export_into(staging.path())?;
        let staged_document = staging.path().join(PANEL_DATA_FILE);
        document.write_to(&staged_document)?;
        publish_permissions(staging.path())?;

        let output_root = self.output_root();
        if output_root.exists() {
            fs::remove_dir_all(output_root).map_err(|err| PanelError::io(output_root, err))?;
        }
        let staged = staging.into_path();
        if let Err(err) = fs::rename(&staged, output_root) {
            let _ = fs::remove_dir_all(&staged);
            return Err(PanelError::io(output_root, err));
        }

        info!(samples = self.sample_ids.len(), output = %output_root.display(), "export complete");
        Ok(ExportOutcome::Completed(ExportSummary {
            output_root: output_root.to_path_buf(),
            document: output_root.join(PANEL_DATA_FILE),
            samples: self.sample_ids.len(),
        }))
    }

    fn export_into(&self, destination: &Path) -> PanelResult<AggregateDocument> {
        let exporter = Exporter::new(&self.source, &self.basis, &self.config.signals);
        let export_one = |sample: &String| -> PanelResult<(String, LoadingsRecord)> {
            info!(sample = %sample, "exporting sample");
            let record = exporter.build_loadings_record(sample)?;
            exporter.materialize_image_sets(sample, destination)?;
            Ok((sample.clone(), record))
        };

        let records: Vec<(String, LoadingsRecord)> = if self.config.jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.jobs)
                .build()
                .map_err(|err| PanelError::Config {
                    reason: format!("failed to start {} workers: {err}", self.config.jobs),
                })?;
            pool.install(|| {
                self.sample_ids
                    .par_iter()
                    .map(export_one)
                    .collect::<PanelResult<Vec<_>>>()
            })?
        } else {
            self.sample_ids
                .iter()
                .map(export_one)
                .collect::<PanelResult<Vec<_>>>()?
        };

        let mut document = AggregateDocument::new(
            &self.global_loadings,
            self.config.base_rows,
            self.config.base_cols,
        );
        for (sample, record) in records {
            document.insert_sample(sample, record);
        }
        Ok(document)
    }
}

#[cfg(unix)]
fn publish_permissions(dir: &Path) -> PanelResult<()> {
    use std::os::unix::fs::PermissionsExt;
    // temp dirs are created 0700; the viewer is served from this tree
    fs::set_permissions(dir, fs::Permissions::from_mode(0o755))
        .map_err(|err| PanelError::io(dir, err))
}

#[cfg(not(unix))]
fn publish_permissions(_dir: &Path) -> PanelResult<()> {
    Ok(())
}
