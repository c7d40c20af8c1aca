// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the panel exporter.
pub type PanelResult<T> = Result<T, PanelError>;

/// Errors emitted while projecting or exporting introspection panels.
#[derive(Debug, Error)]
pub enum PanelError {
    /// Array or basis shapes cannot be combined.
    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: String,
        expected: String,
        got: String,
    },
    /// A scale entry would divide by zero or propagate NaNs.
    #[error("degenerate basis: scale[{index}] = {value} must be finite and strictly positive")]
    DegenerateBasis { index: usize, value: f64 },
    /// An expected named array is absent.
    #[error("missing artifact '{signal}' for {sample} (looked for {})", .path.display())]
    MissingArtifact {
        sample: String,
        signal: String,
        path: PathBuf,
    },
    /// The destination is already populated.
    #[error("refusing to overwrite existing path {}", .path.display())]
    IoConflict { path: PathBuf },
    /// A `.npy` payload could not be decoded.
    #[error("malformed array {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("i/o error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to serialise panel document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl PanelError {
    pub(crate) fn dimension(
        context: impl Into<String>,
        expected: impl ToString,
        got: impl ToString,
    ) -> Self {
        PanelError::DimensionMismatch {
            context: context.into(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PanelError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PanelError::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_sample_and_signal() {
        let err = PanelError::MissingArtifact {
            sample: "sample_00002".into(),
            signal: "grad_hx_value".into(),
            path: PathBuf::from("in/sample_00002/grad_hx_value.npy"),
        };
        let message = err.to_string();
        assert!(message.contains("sample_00002"));
        assert!(message.contains("grad_hx_value"));
    }

    #[test]
    fn degenerate_basis_reports_index() {
        let err = PanelError::DegenerateBasis {
            index: 3,
            value: 0.0,
        };
        assert!(err.to_string().contains("scale[3]"));
    }
}
