// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Storage seam between the exporter and wherever the recorded arrays live.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PanelError, PanelResult};
use crate::npy::{self, NpyArray};

/// Sample directories underneath the training output tree.
pub const DEFAULT_SAMPLES_SUBDIR: &str = "generative/recorded_informinit_gen_samples";
/// Precomputed hidden-state analysis underneath the training output tree.
pub const DEFAULT_ANALYSIS_SUBDIR: &str = "analysis/hx_analysis_precomp";

/// Label used in errors for arrays that do not belong to a sample.
pub const ANALYSIS_SCOPE: &str = "analysis";

/// Resolves named arrays for samples and for the shared analysis artefacts.
///
/// Implementations must be shareable across worker threads.
pub trait ArraySource: Send + Sync {
    /// Loads `file_name` recorded for `sample_id`.
    fn load_sample(&self, sample_id: &str, file_name: &str) -> PanelResult<NpyArray>;

    /// Loads a run-wide artefact such as the basis or global coordinates.
    fn load_analysis(&self, file_name: &str) -> PanelResult<NpyArray>;
}

/// `.npy` files laid out the way the training tree writes them.
#[derive(Clone, Debug)]
pub struct FsArraySource {
    samples_dir: PathBuf,
    analysis_dir: PathBuf,
}

impl FsArraySource {
    pub fn new(input_root: impl AsRef<Path>) -> Self {
        Self::with_layout(input_root, DEFAULT_SAMPLES_SUBDIR, DEFAULT_ANALYSIS_SUBDIR)
    }

    pub fn with_layout(
        input_root: impl AsRef<Path>,
        samples_subdir: impl AsRef<Path>,
        analysis_subdir: impl AsRef<Path>,
    ) -> Self {
        let root = input_root.as_ref();
        Self {
            samples_dir: root.join(samples_subdir),
            analysis_dir: root.join(analysis_subdir),
        }
    }

    pub fn sample_path(&self, sample_id: &str, file_name: &str) -> PathBuf {
        self.samples_dir.join(sample_id).join(file_name)
    }

    pub fn analysis_path(&self, file_name: &str) -> PathBuf {
        self.analysis_dir.join(file_name)
    }

    fn read(&self, scope: &str, file_name: &str, path: PathBuf) -> PanelResult<NpyArray> {
        match npy::read_npy(&path) {
            Ok(array) => {
                debug!(scope, file = file_name, shape = ?array.shape(), "loaded array");
                Ok(array)
            }
            Err(PanelError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Err(PanelError::MissingArtifact {
                    sample: scope.to_string(),
                    signal: signal_name(file_name).to_string(),
                    path,
                })
            }
            Err(err) => Err(err),
        }
    }
}

impl ArraySource for FsArraySource {
    fn load_sample(&self, sample_id: &str, file_name: &str) -> PanelResult<NpyArray> {
        self.read(sample_id, file_name, self.sample_path(sample_id, file_name))
    }

    fn load_analysis(&self, file_name: &str) -> PanelResult<NpyArray> {
        self.read(ANALYSIS_SCOPE, file_name, self.analysis_path(file_name))
    }
}

/// In-memory arrays keyed by sample and file name.
#[derive(Clone, Debug, Default)]
pub struct MemoryArraySource {
    samples: HashMap<(String, String), NpyArray>,
    analysis: HashMap<String, NpyArray>,
}

impl MemoryArraySource {
    pub fn insert_sample(
        &mut self,
        sample_id: impl Into<String>,
        file_name: impl Into<String>,
        array: NpyArray,
    ) {
        self.samples
            .insert((sample_id.into(), file_name.into()), array);
    }

    pub fn insert_analysis(&mut self, file_name: impl Into<String>, array: NpyArray) {
        self.analysis.insert(file_name.into(), array);
    }
}

impl ArraySource for MemoryArraySource {
    fn load_sample(&self, sample_id: &str, file_name: &str) -> PanelResult<NpyArray> {
        self.samples
            .get(&(sample_id.to_string(), file_name.to_string()))
            .cloned()
            .ok_or_else(|| PanelError::MissingArtifact {
                sample: sample_id.to_string(),
                signal: signal_name(file_name).to_string(),
                path: Path::new(sample_id).join(file_name),
            })
    }

    fn load_analysis(&self, file_name: &str) -> PanelResult<NpyArray> {
        self.analysis
            .get(file_name)
            .cloned()
            .ok_or_else(|| PanelError::MissingArtifact {
                sample: ANALYSIS_SCOPE.to_string(),
                signal: signal_name(file_name).to_string(),
                path: PathBuf::from(file_name),
            })
    }
}

fn signal_name(file_name: &str) -> &str {
    file_name.strip_suffix(".npy").unwrap_or(file_name)
}
