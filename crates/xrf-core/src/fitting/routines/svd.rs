use super::{
    BasisSlot, FitOutcome, FitRoutine, collect_intensities, finalize, prepare_spectrum,
};
use crate::domain::{EnergyRange, FittingRoutineKind, OptimizerOutcome, XrfError, XrfResult};
use crate::fitting::accumulator::SpectraAccumulator;
use crate::fitting::element_models::{ElementsToFit, generate_element_models};
use crate::fitting::matrix::FitMatrix;
use crate::fitting::model::FitModel;
use crate::numerics::{DenseMatrix, SvdError, matvec, svd_decompose};
use std::sync::Arc;

const SINGULAR_VALUE_CUTOFF: f64 = 1.0e-12;

impl From<SvdError> for XrfError {
    fn from(error: SvdError) -> Self {
        XrfError::computation("RUN.SVD_DECOMPOSITION", error.to_string())
    }
}

#[derive(Debug)]
struct SvdBasis {
    fit: FitMatrix,
    pseudo_inverse: DenseMatrix,
}

/// Unconstrained least-squares intensities through a cached pseudo-inverse.
/// Intensities may be negative.
#[derive(Debug)]
pub struct SvdFitRoutine {
    accumulator: Arc<SpectraAccumulator>,
    basis: BasisSlot<SvdBasis>,
}

impl SvdFitRoutine {
    pub fn new(accumulator: Arc<SpectraAccumulator>) -> Self {
        Self {
            accumulator,
            basis: BasisSlot::default(),
        }
    }
}

impl FitRoutine for SvdFitRoutine {
    fn kind(&self) -> FittingRoutineKind {
        FittingRoutineKind::Svd
    }

    fn initialize(
        &self,
        model: &FitModel,
        elements: &ElementsToFit,
        energy_range: EnergyRange,
    ) -> XrfResult<()> {
        if self.accumulator.len() != energy_range.count() {
            return Err(XrfError::computation(
                "RUN.ACCUMULATOR",
                format!(
                    "accumulator spans {} channels but the fit window {} has {}",
                    self.accumulator.len(),
                    energy_range,
                    energy_range.count()
                ),
            ));
        }
        let models = generate_element_models(model, elements, energy_range);
        let fit = FitMatrix::build(energy_range, &models)?;
        let decomposition = svd_decompose(fit.matrix())?;
        tracing::debug!(
            sweeps = decomposition.sweeps(),
            singular_values = ?decomposition.singular_values(),
            "cached svd pseudo-inverse"
        );
        let pseudo_inverse = decomposition.pseudo_inverse(SINGULAR_VALUE_CUTOFF);
        self.basis.install(SvdBasis {
            fit,
            pseudo_inverse,
        });
        Ok(())
    }

    fn fit_spectra(
        &self,
        model: &FitModel,
        spectrum: &[f64],
        elements: &ElementsToFit,
    ) -> XrfResult<FitOutcome> {
        let basis = self.basis.current(self.kind())?;
        let prepared = prepare_spectrum(model, spectrum, basis.fit.energy_range())?;
        let solution = matvec(&basis.pseudo_inverse, &prepared.target);

        let fitted = basis.fit.reconstruct(&solution, &prepared.background)?;
        let residual = fitted
            .iter()
            .zip(&prepared.background)
            .zip(&prepared.target)
            .map(|((value, background), target)| (value - background - target).powi(2))
            .sum::<f64>()
            .sqrt();
        self.accumulator.add_pixel(&fitted, &prepared.background)?;

        Ok(finalize(FitOutcome {
            status: OptimizerOutcome::Converged,
            intensities: collect_intensities(elements, basis.fit.columns(), &solution),
            iterations: 1,
            residual,
        }))
    }

    fn energy_range(&self) -> Option<EnergyRange> {
        self.basis.peek().map(|basis| basis.fit.energy_range())
    }
}
