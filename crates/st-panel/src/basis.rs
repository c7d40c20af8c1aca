// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ndarray::{Array1, Array2, Ix1, Ix2};
use tracing::debug;

use crate::error::{PanelError, PanelResult};
use crate::npy::NpyArray;
use crate::source::ArraySource;

/// Principal-component basis fitted on standardised hidden states.
///
/// `components` is `[K, D]`, `mean` and `scale` are `[D]`. Every `scale`
/// entry is finite and strictly positive once constructed.
#[derive(Clone, Debug)]
pub struct PcBasis {
    components: Array2<f64>,
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl PcBasis {
    pub fn new(
        components: Array2<f64>,
        mean: Array1<f64>,
        scale: Array1<f64>,
    ) -> PanelResult<Self> {
        let (k, d) = components.dim();
        if mean.len() != d {
            return Err(PanelError::dimension("basis mean", d, mean.len()));
        }
        if scale.len() != d {
            return Err(PanelError::dimension("basis scale", d, scale.len()));
        }
        if k > d {
            return Err(PanelError::dimension(
                "basis components",
                format!("at most {d} components"),
                k,
            ));
        }
        if let Some((index, &value)) = scale
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v <= 0.0)
        {
            return Err(PanelError::DegenerateBasis { index, value });
        }
        Ok(Self {
            components,
            mean,
            scale,
        })
    }

    /// Loads `pcomponents_<suffix>`, `hx_mu_<suffix>` and `hx_std_<suffix>`.
    pub fn load<S: ArraySource + ?Sized>(source: &S, suffix: &str) -> PanelResult<Self> {
        let components = source.load_analysis(&format!("pcomponents_{suffix}.npy"))?;
        let mean = source.load_analysis(&format!("hx_mu_{suffix}.npy"))?;
        let scale = source.load_analysis(&format!("hx_std_{suffix}.npy"))?;
        let basis = Self::new(
            matrix(&components, "pcomponents")?,
            vector(&mean, "hx_mu")?,
            vector(&scale, "hx_std")?,
        )?;
        debug!(
            components = basis.num_components(),
            dim = basis.dim(),
            suffix,
            "loaded pc basis"
        );
        Ok(basis)
    }

    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Number of basis vectors (K).
    pub fn num_components(&self) -> usize {
        self.components.nrows()
    }

    /// Raw-space dimension (D).
    pub fn dim(&self) -> usize {
        self.components.ncols()
    }
}

/// Interprets a decoded array as a rank-2 `f64` matrix.
pub(crate) fn matrix(array: &NpyArray, label: &str) -> PanelResult<Array2<f64>> {
    array
        .to_f64()
        .into_dimensionality::<Ix2>()
        .map_err(|_| PanelError::dimension(label, "rank 2", format!("shape {:?}", array.shape())))
}

fn vector(array: &NpyArray, label: &str) -> PanelResult<Array1<f64>> {
    array
        .to_f64()
        .into_dimensionality::<Ix1>()
        .map_err(|_| PanelError::dimension(label, "rank 1", format!("shape {:?}", array.shape())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryArraySource;
    use ndarray::array;

    #[test]
    fn rejects_zero_scale() {
        let err = PcBasis::new(array![[1.0, 0.0]], array![0.0, 0.0], array![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, PanelError::DegenerateBasis { index: 1, .. }));
    }

    #[test]
    fn rejects_non_finite_and_negative_scale() {
        assert!(matches!(
            PcBasis::new(array![[1.0, 0.0]], array![0.0, 0.0], array![f64::NAN, 1.0]),
            Err(PanelError::DegenerateBasis { index: 0, .. })
        ));
        assert!(matches!(
            PcBasis::new(array![[1.0, 0.0]], array![0.0, 0.0], array![1.0, -2.0]),
            Err(PanelError::DegenerateBasis { index: 1, .. })
        ));
    }

    #[test]
    fn rejects_inconsistent_dimensions() {
        assert!(matches!(
            PcBasis::new(array![[1.0, 0.0]], array![0.0], array![1.0, 1.0]),
            Err(PanelError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            PcBasis::new(array![[1.0], [0.0]], array![0.0], array![1.0]),
            Err(PanelError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn loads_suffixed_analysis_files() {
        let mut source = MemoryArraySource::default();
        source.insert_analysis(
            "pcomponents_7.npy",
            NpyArray::from_f32(array![[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0]].into_dyn()),
        );
        source.insert_analysis("hx_mu_7.npy", NpyArray::from_f64(array![1.0, 2.0, 3.0].into_dyn()));
        source.insert_analysis(
            "hx_std_7.npy",
            NpyArray::from_f64(array![1.0, 1.0, 2.0].into_dyn()),
        );
        let basis = PcBasis::load(&source, "7").unwrap();
        assert_eq!(basis.num_components(), 2);
        assert_eq!(basis.dim(), 3);
        assert_eq!(basis.scale()[2], 2.0);
    }

    #[test]
    fn missing_analysis_file_is_reported() {
        let source = MemoryArraySource::default();
        let err = PcBasis::load(&source, "4000").unwrap_err();
        assert!(matches!(err, PanelError::MissingArtifact { .. }));
    }
}
