// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Projection of hidden states and hidden-state gradients into PC space.
//!
//! The basis was fitted on standardised states `x' = (x - mean) / scale`.
//! States therefore go through the full standardisation before projection.
//! Gradients are taken with respect to the raw coordinates, so the chain rule
//! rescales each basis vector by `scale` instead: `g @ (components * scale)^T`.
//! Gradients are never centred and never divided by `scale`.

use ndarray::{Array2, ArrayView2, Axis};

use crate::basis::PcBasis;
use crate::error::{PanelError, PanelResult};

fn ensure_columns(batch: &ArrayView2<'_, f64>, basis: &PcBasis, context: &str) -> PanelResult<()> {
    if batch.ncols() != basis.dim() {
        return Err(PanelError::dimension(
            context,
            format!("{} columns", basis.dim()),
            format!("{} columns", batch.ncols()),
        ));
    }
    Ok(())
}

/// `((X - mean) / scale) @ components^T`, `[N, D] -> [N, K]`.
pub fn transform_states(states: ArrayView2<'_, f64>, basis: &PcBasis) -> PanelResult<Array2<f64>> {
    ensure_columns(&states, basis, "state batch")?;
    let mean = basis.mean().view().insert_axis(Axis(0));
    let scale = basis.scale().view().insert_axis(Axis(0));
    let standardised = (&states - &mean) / &scale;
    Ok(standardised.dot(&basis.components().t()))
}

/// `G @ (components * scale)^T`, `[N, D] -> [N, K]`.
pub fn transform_gradients(
    gradients: ArrayView2<'_, f64>,
    basis: &PcBasis,
) -> PanelResult<Array2<f64>> {
    ensure_columns(&gradients, basis, "gradient batch")?;
    let scale = basis.scale().view().insert_axis(Axis(0));
    let scaled_basis = basis.components() * &scale;
    Ok(gradients.dot(&scaled_basis.t()))
}

/// Maps PC coordinates back to raw space: `(Y @ components) * scale + mean`.
///
/// Exact inverse of [`transform_states`] when the basis is square and
/// orthonormal; otherwise the reconstruction from the retained components.
pub fn inverse_transform_states(
    loadings: ArrayView2<'_, f64>,
    basis: &PcBasis,
) -> PanelResult<Array2<f64>> {
    if loadings.ncols() != basis.num_components() {
        return Err(PanelError::dimension(
            "loadings batch",
            format!("{} columns", basis.num_components()),
            format!("{} columns", loadings.ncols()),
        ));
    }
    let mean = basis.mean().view().insert_axis(Axis(0));
    let scale = basis.scale().view().insert_axis(Axis(0));
    Ok(loadings.dot(basis.components()) * &scale + &mean)
}
