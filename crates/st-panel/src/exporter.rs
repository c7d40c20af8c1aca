// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::basis::{matrix, PcBasis};
use crate::document::LoadingsRecord;
use crate::error::{PanelError, PanelResult};
use crate::projector::{transform_gradients, transform_states};
use crate::raster::write_frame_set;
use crate::signals::{Projection, SignalSet};
use crate::source::ArraySource;

/// Per-sample export over a shared, read-only basis.
pub struct Exporter<'a, S: ArraySource + ?Sized> {
    source: &'a S,
    basis: &'a PcBasis,
    signals: &'a SignalSet,
}

impl<'a, S: ArraySource + ?Sized> Exporter<'a, S> {
    pub fn new(source: &'a S, basis: &'a PcBasis, signals: &'a SignalSet) -> Self {
        Self {
            source,
            basis,
            signals,
        }
    }

    /// Projects the hidden states and every recorded hidden-state gradient.
    ///
    /// Every array is loaded before anything is projected, so a missing
    /// signal never yields a partial record.
    pub fn build_loadings_record(&self, sample_id: &str) -> PanelResult<LoadingsRecord> {
        let signals = self.signals.loading_signals();
        let batches = signals
            .iter()
            .map(|signal| {
                let array = self.source.load_sample(sample_id, &signal.file_name)?;
                matrix(&array, &format!("{sample_id}/{}", signal.file_name))
            })
            .collect::<PanelResult<Vec<_>>>()?;

        let mut record = LoadingsRecord::default();
        for (signal, batch) in signals.iter().zip(batches) {
            let loadings = match signal.projection {
                Projection::State => transform_states(batch.view(), self.basis),
                Projection::Gradient => transform_gradients(batch.view(), self.basis),
            }
            .map_err(|err| with_sample_context(err, sample_id, &signal.file_name))?;
            debug!(
                sample = sample_id,
                field = %signal.field,
                steps = loadings.nrows(),
                "projected"
            );
            record.insert(signal.field.clone(), &loadings);
        }
        Ok(record)
    }

    /// Writes `destination/<sample_id>/<signal>/<frame>.png` for every image tensor.
    ///
    /// Tensors are loaded and released one at a time.
    pub fn materialize_image_sets(&self, sample_id: &str, destination: &Path) -> PanelResult<()> {
        let sample_dir = destination.join(sample_id);
        fs::create_dir(&sample_dir).map_err(|err| match err.kind() {
            ErrorKind::AlreadyExists => PanelError::IoConflict {
                path: sample_dir.clone(),
            },
            _ => PanelError::io(&sample_dir, err),
        })?;

        for signal in self.signals.image_signals() {
            let frames = self.source.load_sample(sample_id, &signal.file_name)?.to_u8();
            let target = sample_dir.join(&signal.directory);
            let written = write_frame_set(&target, frames, signal.layout)?;
            debug!(
                sample = sample_id,
                signal = %signal.directory,
                frames = written,
                "materialised"
            );
        }
        Ok(())
    }
}

fn with_sample_context(err: PanelError, sample_id: &str, file_name: &str) -> PanelError {
    match err {
        PanelError::DimensionMismatch {
            context,
            expected,
            got,
        } => PanelError::DimensionMismatch {
            context: format!("{context} ({sample_id}/{file_name})"),
            expected,
            got,
        },
        other => other,
    }
}
