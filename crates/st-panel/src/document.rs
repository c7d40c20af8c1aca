// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{PanelError, PanelResult};

/// File name the viewer loads.
pub const PANEL_DATA_FILE: &str = "panel_data.json";

/// Row-major loadings as serialised into the document.
pub type Rows = Vec<Vec<f64>>;

pub fn matrix_rows(matrix: &Array2<f64>) -> Rows {
    matrix.outer_iter().map(|row| row.to_vec()).collect()
}

/// PC-space trajectories of one sample, keyed by document field name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadingsRecord {
    fields: BTreeMap<String, Rows>,
}

impl LoadingsRecord {
    pub(crate) fn insert(&mut self, field: impl Into<String>, loadings: &Array2<f64>) {
        self.fields.insert(field.into(), matrix_rows(loadings));
    }

    pub fn get(&self, field: &str) -> Option<&Rows> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Contents of `panel_data.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateDocument {
    pub base_hx_loadings: Rows,
    pub samples: BTreeMap<String, LoadingsRecord>,
}

impl AggregateDocument {
    /// Keeps the leading `max_rows x max_cols` block of the global coordinates.
    pub fn new(global_loadings: &Array2<f64>, max_rows: usize, max_cols: usize) -> Self {
        let rows = global_loadings.nrows().min(max_rows);
        let cols = global_loadings.ncols().min(max_cols);
        let block = global_loadings.slice(s![..rows, ..cols]).to_owned();
        Self {
            base_hx_loadings: matrix_rows(&block),
            samples: BTreeMap::new(),
        }
    }

    pub fn insert_sample(&mut self, sample_id: impl Into<String>, record: LoadingsRecord) {
        self.samples.insert(sample_id.into(), record);
    }

    pub fn write_to(&self, path: &Path) -> PanelResult<()> {
        let file = File::create(path).map_err(|err| PanelError::io(path, err))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush().map_err(|err| PanelError::io(path, err))
    }
}
