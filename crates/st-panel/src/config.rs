// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PanelError, PanelResult};
use crate::signals::SignalSet;

pub const DEFAULT_SAMPLES: usize = 10;
pub const DEFAULT_INPUT_ROOT: &str = "../train-procgen-pytorch";
pub const DEFAULT_OUTPUT_ROOT: &str = "./static/data";
pub const DEFAULT_BASIS_SUFFIX: &str = "4000";
pub const DEFAULT_BASE_ROWS: usize = 1000;
pub const DEFAULT_BASE_COLS: usize = 20;

/// Options resolved once at startup and fixed for the whole run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Number of samples exported, starting at `sample_00000`.
    pub samples: usize,
    pub input_root: PathBuf,
    /// Replaced wholesale on commit.
    pub output_root: PathBuf,
    /// Selects `pcomponents_<suffix>.npy` and friends.
    pub basis_suffix: String,
    pub signals: SignalSet,
    pub base_rows: usize,
    pub base_cols: usize,
    /// Worker threads used for samples; 1 keeps the export sequential.
    pub jobs: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            input_root: PathBuf::from(DEFAULT_INPUT_ROOT),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            basis_suffix: DEFAULT_BASIS_SUFFIX.to_string(),
            signals: SignalSet::default(),
            base_rows: DEFAULT_BASE_ROWS,
            base_cols: DEFAULT_BASE_COLS,
            jobs: 1,
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> PanelResult<()> {
        if self.jobs == 0 {
            return Err(PanelError::Config {
                reason: "jobs must be at least 1".into(),
            });
        }
        if self.basis_suffix.trim().is_empty() {
            return Err(PanelError::Config {
                reason: "basis suffix must not be empty".into(),
            });
        }
        if self.output_root.as_os_str().is_empty() || self.output_root.parent().is_none() {
            return Err(PanelError::Config {
                reason: format!(
                    "output root '{}' cannot be replaced",
                    self.output_root.display()
                ),
            });
        }
        let mut seen = self.signals.directions.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.signals.directions.len() {
            return Err(PanelError::Config {
                reason: "direction indices must be unique".into(),
            });
        }
        if seen.first() == Some(&0) {
            return Err(PanelError::Config {
                reason: "direction indices are 1-based".into(),
            });
        }
        Ok(())
    }

    /// Makes `output_root` absolute with `.` and `..` resolved, so the
    /// directory commit removes is never an ancestor of its staging area.
    pub fn normalise_output_root(&mut self) -> PanelResult<()> {
        let absolute = if self.output_root.is_absolute() {
            self.output_root.clone()
        } else {
            std::env::current_dir()
                .map_err(|err| PanelError::io(&self.output_root, err))?
                .join(&self.output_root)
        };
        let resolved = lexically_resolved(&absolute);
        if resolved.parent().is_none() {
            return Err(PanelError::Config {
                reason: format!(
                    "output root '{}' resolves to '{}', which cannot be replaced",
                    self.output_root.display(),
                    resolved.display()
                ),
            });
        }
        self.output_root = resolved;
        Ok(())
    }
}

fn lexically_resolved(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}
