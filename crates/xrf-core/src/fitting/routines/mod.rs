//! Per-pixel fit strategies sharing one contract.
//!
//! A routine is initialised once per dataset with the model, the element list
//! and the fit window, then called from many worker threads. Re-initialising
//! swaps the cached basis wholesale, so in-flight fits observe either the old or
//! the new basis.

mod nnls;
mod roi;
mod svd;

pub use nnls::NnlsFitRoutine;
pub use roi::RoiFitRoutine;
pub use svd::SvdFitRoutine;

use super::accumulator::SpectraAccumulator;
use super::background::snip_background;
use super::element_models::ElementsToFit;
use super::matrix::ColumnIndex;
use super::model::FitModel;
use super::params::{NUM_ITR, RESIDUAL};
use crate::domain::{EnergyRange, FittingRoutineKind, OptimizerOutcome, XrfError, XrfResult};
use parking_lot::RwLock;
use std::sync::Arc;

pub trait FitRoutine: Send + Sync {
    fn kind(&self) -> FittingRoutineKind;

    /// Builds the routine's basis for `energy_range` and installs it atomically.
    fn initialize(
        &self,
        model: &FitModel,
        elements: &ElementsToFit,
        energy_range: EnergyRange,
    ) -> XrfResult<()>;

    /// Fits one full-length detector spectrum.
    fn fit_spectra(
        &self,
        model: &FitModel,
        spectrum: &[f64],
        elements: &ElementsToFit,
    ) -> XrfResult<FitOutcome>;

    /// Window of the installed basis, `None` before initialisation.
    fn energy_range(&self) -> Option<EnergyRange>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub status: OptimizerOutcome,
    /// Intensities in fit-list order. Non-finite values are reported as solved.
    pub intensities: Vec<(String, f64)>,
    pub iterations: usize,
    pub residual: f64,
}

impl FitOutcome {
    pub fn intensity(&self, name: &str) -> Option<f64> {
        self.intensities
            .iter()
            .find(|(known, _)| known == name)
            .map(|(_, value)| *value)
    }

    /// Element intensities followed by the `NUM_ITR` and `RESIDUAL` diagnostics.
    pub fn counts(&self) -> Vec<(String, f64)> {
        let mut counts = self.intensities.clone();
        counts.push((NUM_ITR.to_string(), self.iterations as f64));
        counts.push((RESIDUAL.to_string(), self.residual));
        counts
    }

    fn has_non_finite_intensity(&self) -> bool {
        self.intensities.iter().any(|(_, value)| !value.is_finite())
    }
}

pub fn generate_fit_routine(
    kind: FittingRoutineKind,
    max_iterations: usize,
    accumulator: Arc<SpectraAccumulator>,
) -> Box<dyn FitRoutine> {
    match kind {
        FittingRoutineKind::Nnls => Box::new(NnlsFitRoutine::new(max_iterations, accumulator)),
        FittingRoutineKind::Svd => Box::new(SvdFitRoutine::new(accumulator)),
        FittingRoutineKind::Roi => Box::new(RoiFitRoutine::new()),
    }
}

/// Slot holding the basis a routine shares across threads.
#[derive(Debug)]
pub(crate) struct BasisSlot<T> {
    current: RwLock<Option<Arc<T>>>,
}

impl<T> Default for BasisSlot<T> {
    fn default() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }
}

impl<T> BasisSlot<T> {
    pub(crate) fn install(&self, basis: T) {
        *self.current.write() = Some(Arc::new(basis));
    }

    pub(crate) fn current(&self, routine: FittingRoutineKind) -> XrfResult<Arc<T>> {
        self.current.read().clone().ok_or_else(|| {
            XrfError::internal(
                "RUN.ROUTINE_UNINITIALIZED",
                format!("{routine} fit routine used before initialize"),
            )
        })
    }

    pub(crate) fn peek(&self) -> Option<Arc<T>> {
        self.current.read().clone()
    }
}

/// Windowed background and the clipped, background-subtracted solve target.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreparedSpectrum {
    pub(crate) background: Vec<f64>,
    pub(crate) target: Vec<f64>,
}

pub(crate) fn prepare_spectrum(
    model: &FitModel,
    spectrum: &[f64],
    energy_range: EnergyRange,
) -> XrfResult<PreparedSpectrum> {
    let window = energy_range.segment(spectrum)?;
    let background = match model.snip_width() {
        Some(width) => {
            let full = snip_background(
                spectrum,
                &model.calibration(),
                width,
                energy_range.min,
                energy_range.max,
            )?;
            full[energy_range.min..=energy_range.max].to_vec()
        }
        None => vec![0.0; energy_range.count()],
    };

    let target = window
        .iter()
        .zip(&background)
        .map(|(counts, continuum)| {
            let residual = counts - continuum;
            if residual > 0.0 { residual } else { 0.0 }
        })
        .collect();
    Ok(PreparedSpectrum { background, target })
}

/// Pairs solved column values with the fit list, skipping names that have no
/// column.
pub(crate) fn collect_intensities(
    elements: &ElementsToFit,
    columns: &ColumnIndex,
    solution: &[f64],
) -> Vec<(String, f64)> {
    elements
        .iter()
        .filter_map(|element| {
            let column = columns.column_of(element.name())?;
            let value = solution.get(column).copied()?;
            Some((element.name().to_string(), value))
        })
        .collect()
}

/// Marks outcomes with non-finite intensities as failed.
pub(crate) fn finalize(mut outcome: FitOutcome) -> FitOutcome {
    if outcome.has_non_finite_intensity() {
        tracing::debug!(
            intensities = ?outcome.intensities,
            "non-finite intensity excluded from the aggregate"
        );
        outcome.status = OptimizerOutcome::Failed;
    }
    outcome
}


#[cfg(test)]
mod tests {
    use super::test_support::{model, synthetic_spectrum, window};
    use super::{FitOutcome, finalize, generate_fit_routine, prepare_spectrum};
    use crate::domain::{FittingRoutineKind, OptimizerOutcome, XrfErrorCategory};
    use crate::fitting::accumulator::SpectraAccumulator;
    use crate::fitting::element_models::ElementsToFit;
    use crate::fitting::params::{FitParam, NUM_ITR, RESIDUAL, SNIP_WIDTH};
    use std::sync::Arc;

    #[test]
    fn factory_installs_requested_strategy() {
        let accumulator = Arc::new(SpectraAccumulator::new(window().count()));
        for kind in FittingRoutineKind::ALL {
            let routine = generate_fit_routine(kind, 50, Arc::clone(&accumulator));
            assert_eq!(routine.kind(), kind);
            assert!(routine.energy_range().is_none());
        }
    }

    #[test]
    fn fitting_before_initialize_is_an_internal_error() {
        let accumulator = Arc::new(SpectraAccumulator::new(window().count()));
        let elements = ElementsToFit::resolve(["Fe"]);
        for kind in FittingRoutineKind::ALL {
            let routine = generate_fit_routine(kind, 50, Arc::clone(&accumulator));
            let error = routine
                .fit_spectra(&model(), &[0.0; 1024], &elements)
                .expect_err("uninitialised routine should fail");
            assert_eq!(error.category(), XrfErrorCategory::InternalError);
        }
    }

    #[test]
    fn prepared_target_is_clipped_and_background_free_without_snip_width() {
        let mut spectrum = vec![1.0; 1024];
        spectrum[150] = -3.0;
        spectrum[151] = f64::NAN;
        let prepared = prepare_spectrum(&model(), &spectrum, window()).expect("prepare");

        assert_eq!(prepared.target.len(), window().count());
        assert!(prepared.background.iter().all(|value| *value == 0.0));
        assert_eq!(prepared.target[50], 0.0);
        assert_eq!(prepared.target[51], 0.0);
        assert_eq!(prepared.target[52], 1.0);
    }

    #[test]
    fn prepared_target_subtracts_snip_background() {
        let mut model = model();
        model
            .parameters_mut()
            .add_parameter(FitParam::fixed(SNIP_WIDTH, 0.5));
        let elements = ElementsToFit::resolve(["Fe"]);
        let mut spectrum = synthetic_spectrum(&model, &elements, &[("Fe", 5.0e4)]);
        for value in &mut spectrum {
            *value += 20.0;
        }

        let prepared = prepare_spectrum(&model, &spectrum, window()).expect("prepare");
        let continuum_channel = 300 - window().min;
        assert!(prepared.background[continuum_channel] > 15.0);
        assert!(prepared.target.iter().all(|value| *value >= 0.0));
        assert!(prepared.target[640 - window().min] > 1_000.0);
    }

    #[test]
    fn short_spectrum_is_a_structural_error() {
        let error = prepare_spectrum(&model(), &[1.0; 512], window()).expect_err("too short");
        assert_eq!(error.category(), XrfErrorCategory::ComputationError);
    }

    #[test]
    fn counts_append_diagnostics_and_non_finite_marks_failure() {
        let outcome = FitOutcome {
            status: OptimizerOutcome::Converged,
            intensities: vec![("Fe".to_string(), f64::NAN), ("Cu".to_string(), 2.0)],
            iterations: 3,
            residual: 0.5,
        };
        let counts = outcome.counts();
        assert_eq!(counts[2], (NUM_ITR.to_string(), 3.0));
        assert_eq!(counts[3], (RESIDUAL.to_string(), 0.5));

        let finalized = finalize(outcome);
        assert_eq!(finalized.status, OptimizerOutcome::Failed);
        assert!(finalized.intensity("Fe").expect("Fe").is_nan());
        assert_eq!(finalized.intensity("Cu"), Some(2.0));
    }
}
