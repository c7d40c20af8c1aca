// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Static export of agent introspection panels.
//!
//! Recorded hidden-state trajectories and their gradients are projected into
//! a shared principal-component space and written, together with observation
//! and saliency frames, as a dataset the browser panel viewer loads directly:
//!
//! ```text
//! <output>/panel_data.json
//! <output>/<sample_id>/<signal>/<frame>.png
//! ```

pub mod basis;
pub mod config;
pub mod document;
pub mod error;
pub mod exporter;
pub mod npy;
pub mod plan;
pub mod projector;
pub mod raster;
pub mod signals;
pub mod source;
pub mod telemetry;

pub use basis::PcBasis;
pub use config::ExportConfig;
pub use document::{AggregateDocument, LoadingsRecord, PANEL_DATA_FILE};
pub use error::{PanelError, PanelResult};
pub use exporter::Exporter;
pub use npy::NpyArray;
pub use plan::{Confirmation, ExportOutcome, ExportPlan, ExportSummary};
pub use projector::{inverse_transform_states, transform_gradients, transform_states};
pub use signals::{sample_id, SignalSet};
pub use source::{ArraySource, FsArraySource, MemoryArraySource};
