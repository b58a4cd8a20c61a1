//! Packs element basis curves into the dense fit matrix.

use super::element_models::ElementModelSet;
use crate::domain::{EnergyRange, XrfError, XrfResult};
use crate::numerics::DenseMatrix;

/// Column assignment of a fit matrix. Columns follow the insertion order of
/// the element model set and are contiguous from zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnIndex {
    names: Vec<String>,
}

impl ColumnIndex {
    pub fn column_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|known| known == name)
    }

    pub fn name_of(&self, column: usize) -> Option<&str> {
        self.names.get(column).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(column, name)| (column, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FitMatrix {
    matrix: DenseMatrix,
    columns: ColumnIndex,
    energy_range: EnergyRange,
}

impl FitMatrix {
    /// Rows are the channels of `energy_range`, columns the curves of `models`.
    pub fn build(energy_range: EnergyRange, models: &ElementModelSet) -> XrfResult<Self> {
        if models.is_empty() {
            return Err(XrfError::computation(
                "RUN.FIT_MATRIX",
                "cannot build a fit matrix without element models",
            ));
        }

        let rows = energy_range.count();
        let mut matrix = DenseMatrix::zeros(rows, models.len());
        let mut names = Vec::with_capacity(models.len());
        for (column, (name, curve)) in models.iter().enumerate() {
            if curve.len() != rows {
                return Err(XrfError::computation(
                    "RUN.FIT_MATRIX",
                    format!(
                        "element model '{}' spans {} channels but the fit window {} has {}",
                        name,
                        curve.len(),
                        energy_range,
                        rows
                    ),
                ));
            }
            for (row, value) in curve.iter().enumerate() {
                matrix[(row, column)] = *value;
            }
            names.push(name.to_string());
        }

        tracing::debug!(rows, cols = names.len(), window = %energy_range, "built fit matrix");
        Ok(Self {
            matrix,
            columns: ColumnIndex { names },
            energy_range,
        })
    }

    pub fn matrix(&self) -> &DenseMatrix {
        &self.matrix
    }

    pub fn columns(&self) -> &ColumnIndex {
        &self.columns
    }

    pub fn energy_range(&self) -> EnergyRange {
        self.energy_range
    }

    pub fn rows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn cols(&self) -> usize {
        self.matrix.ncols()
    }

    /// Background plus each finite `intensity * column` contribution.
    pub fn reconstruct(&self, intensities: &[f64], background: &[f64]) -> XrfResult<Vec<f64>> {
        if intensities.len() != self.cols() || background.len() != self.rows() {
            return Err(XrfError::computation(
                "RUN.FIT_MATRIX",
                format!(
                    "model reconstruction expects {} intensities and {} background channels, got {} and {}",
                    self.cols(),
                    self.rows(),
                    intensities.len(),
                    background.len()
                ),
            ));
        }

        let mut model = background.to_vec();
        for (column, &intensity) in intensities.iter().enumerate() {
            for (row, slot) in model.iter_mut().enumerate() {
                let contribution = self.matrix[(row, column)] * intensity;
                if contribution.is_finite() {
                    *slot += contribution;
                }
            }
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::FitMatrix;
    use crate::domain::{EnergyRange, XrfErrorCategory};
    use crate::fitting::element_models::ElementModelSet;

    fn models() -> ElementModelSet {
        let mut models = ElementModelSet::new();
        models.insert("Zn", vec![0.0, 1.0, 2.0]);
        models.insert("Ca", vec![3.0, 0.0, 1.0]);
        models
    }

    #[test]
    fn columns_follow_insertion_order() {
        let range = EnergyRange::new(10, 12).expect("range");
        let fit = FitMatrix::build(range, &models()).expect("matrix");

        assert_eq!(fit.rows(), 3);
        assert_eq!(fit.cols(), 2);
        assert_eq!(fit.columns().column_of("Zn"), Some(0));
        assert_eq!(fit.columns().column_of("Ca"), Some(1));
        assert_eq!(fit.columns().name_of(1), Some("Ca"));
        assert_eq!(fit.matrix()[(2, 0)], 2.0);
        assert_eq!(fit.matrix()[(0, 1)], 3.0);
    }

    #[test]
    fn rebuilding_is_deterministic() {
        let range = EnergyRange::new(0, 2).expect("range");
        let first = FitMatrix::build(range, &models()).expect("first");
        let second = FitMatrix::build(range, &models()).expect("second");

        assert_eq!(first.columns(), second.columns());
        for row in 0..first.rows() {
            for col in 0..first.cols() {
                assert_eq!(first.matrix()[(row, col)], second.matrix()[(row, col)]);
            }
        }
    }

    #[test]
    fn curve_length_mismatch_is_a_computation_error() {
        let range = EnergyRange::new(0, 3).expect("range");
        let error = FitMatrix::build(range, &models()).expect_err("mismatch should fail");
        assert_eq!(error.category(), XrfErrorCategory::ComputationError);
        assert_eq!(error.placeholder(), "RUN.FIT_MATRIX");
    }

    #[test]
    fn reconstruction_skips_non_finite_contributions() {
        let mut models = ElementModelSet::new();
        models.insert("A", vec![1.0, f64::INFINITY]);
        models.insert("B", vec![0.5, 0.5]);
        let fit = FitMatrix::build(EnergyRange::new(0, 1).expect("range"), &models)
            .expect("matrix");

        let model = fit.reconstruct(&[2.0, 4.0], &[1.0, 1.0]).expect("reconstruct");
        assert_eq!(model, vec![5.0, 3.0]);
    }
}
