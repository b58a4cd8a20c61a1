use super::{
    BasisSlot, FitOutcome, FitRoutine, collect_intensities, finalize, prepare_spectrum,
};
use crate::domain::{EnergyRange, FittingRoutineKind, OptimizerOutcome, XrfError, XrfResult};
use crate::fitting::accumulator::SpectraAccumulator;
use crate::fitting::element_models::{ElementsToFit, generate_element_models};
use crate::fitting::matrix::FitMatrix;
use crate::fitting::model::FitModel;
use crate::numerics::{NnlsError, NnlsSolver};
use std::sync::Arc;

impl From<NnlsError> for XrfError {
    fn from(error: NnlsError) -> Self {
        XrfError::computation("RUN.NNLS_SHAPE", error.to_string())
    }
}

/// Non-negative solve of each background-subtracted spectrum against the
/// element basis.
#[derive(Debug)]
pub struct NnlsFitRoutine {
    solver: NnlsSolver,
    accumulator: Arc<SpectraAccumulator>,
    basis: BasisSlot<FitMatrix>,
}

impl NnlsFitRoutine {
    pub fn new(max_iterations: usize, accumulator: Arc<SpectraAccumulator>) -> Self {
        Self {
            solver: NnlsSolver::new(max_iterations),
            accumulator,
            basis: BasisSlot::default(),
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.solver.max_iterations()
    }
}

impl FitRoutine for NnlsFitRoutine {
    fn kind(&self) -> FittingRoutineKind {
        FittingRoutineKind::Nnls
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
        let matrix = FitMatrix::build(energy_range, &models)?;
        self.basis.install(matrix);
        Ok(())
    }

    fn fit_spectra(
        &self,
        model: &FitModel,
        spectrum: &[f64],
        elements: &ElementsToFit,
    ) -> XrfResult<FitOutcome> {
        let basis = self.basis.current(self.kind())?;
        let prepared = prepare_spectrum(model, spectrum, basis.energy_range())?;
        let solution = self.solver.solve(basis.matrix(), &prepared.target)?;

        let fitted = basis.reconstruct(&solution.x, &prepared.background)?;
        self.accumulator.add_pixel(&fitted, &prepared.background)?;

        let status = if solution.converged {
            OptimizerOutcome::Converged
        } else {
            tracing::trace!(
                iterations = solution.iterations,
                kkt_residual = solution.kkt_residual,
                "nnls solve exhausted its iteration cap"
            );
            OptimizerOutcome::Exhausted
        };
        Ok(finalize(FitOutcome {
            status,
            intensities: collect_intensities(elements, basis.columns(), &solution.x),
            iterations: solution.iterations,
            residual: solution.kkt_residual,
        }))
    }

    fn energy_range(&self) -> Option<EnergyRange> {
        self.basis.peek().map(|basis| basis.energy_range())
    }
}
