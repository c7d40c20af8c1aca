// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Names of the recorded arrays and of the exported fields they feed.

use serde::{Deserialize, Serialize};

/// PC directions whose hidden-state gradients are recorded by default.
pub const DEFAULT_DIRECTIONS: [usize; 3] = [1, 2, 3];

/// How a recorded batch is carried into PC space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    /// Standardise then project (hidden states).
    State,
    /// Rescale the basis and project without centring (gradients).
    Gradient,
}

/// One recorded hidden-state batch and the document field it becomes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadingSignal {
    pub file_name: String,
    pub field: String,
    pub projection: Projection,
}

/// Layout of a recorded image tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameLayout {
    /// `[N, C, H, W]`, reordered before rasterising.
    ChannelsFirst,
    /// `[N, H, W, C]`.
    ChannelsLast,
}

/// One recorded image tensor and the directory its frames are written to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageSignal {
    pub file_name: String,
    pub directory: String,
    pub layout: FrameLayout,
}

/// The configurable family of signals exported for every sample.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSet {
    /// 1-based PC direction indices with recorded gradients and saliency.
    pub directions: Vec<usize>,
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::with_directions(DEFAULT_DIRECTIONS)
    }
}

impl SignalSet {
    pub fn with_directions(directions: impl IntoIterator<Item = usize>) -> Self {
        Self {
            directions: directions.into_iter().collect(),
        }
    }

    /// State batch first, then value, action and each direction gradient.
    pub fn loading_signals(&self) -> Vec<LoadingSignal> {
        let mut signals = vec![
            LoadingSignal {
                file_name: "agent_hxs.npy".into(),
                field: "hx_loadings".into(),
                projection: Projection::State,
            },
            LoadingSignal {
                file_name: "grad_hx_value.npy".into(),
                field: "grad_hx_value_loadings".into(),
                projection: Projection::Gradient,
            },
            LoadingSignal {
                file_name: "grad_hx_action.npy".into(),
                field: "grad_hx_action_loadings".into(),
                projection: Projection::Gradient,
            },
        ];
        signals.extend(self.directions.iter().map(|idx| LoadingSignal {
            file_name: format!("grad_hx_hx_direction_{idx}.npy"),
            field: format!("grad_hx_hx_direction_{idx}_loadings"),
            projection: Projection::Gradient,
        }));
        signals
    }

    /// Observation frames followed by every saliency tensor.
    pub fn image_signals(&self) -> Vec<ImageSignal> {
        let mut signals = vec![
            ImageSignal {
                file_name: "obs.npy".into(),
                directory: "obs".into(),
                layout: FrameLayout::ChannelsFirst,
            },
            ImageSignal {
                file_name: "grad_processed_obs_action.npy".into(),
                directory: "sal_action".into(),
                layout: FrameLayout::ChannelsLast,
            },
            ImageSignal {
                file_name: "grad_processed_obs_value.npy".into(),
                directory: "sal_value".into(),
                layout: FrameLayout::ChannelsLast,
            },
        ];
        signals.extend(self.directions.iter().map(|idx| ImageSignal {
            file_name: format!("grad_processed_obs_hx_direction_{idx}.npy"),
            directory: format!("sal_direction_{idx}"),
            layout: FrameLayout::ChannelsLast,
        }));
        signals
    }
}

/// Identifier of the `index`-th recorded sample.
pub fn sample_id(index: usize) -> String {
    format!("sample_{index:05}")
}
