use super::{BasisSlot, FitOutcome, FitRoutine, finalize};
use crate::domain::{EnergyRange, FittingRoutineKind, OptimizerOutcome, XrfResult};
use crate::fitting::element_models::ElementsToFit;
use crate::fitting::model::FitModel;

#[derive(Debug, Clone, PartialEq)]
struct RoiWindow {
    name: String,
    min: usize,
    max: usize,
}

#[derive(Debug)]
struct RoiWindows {
    energy_range: EnergyRange,
    windows: Vec<RoiWindow>,
}

/// Sums raw counts within one FWHM of each element's strongest line. No solve
/// takes place and the dataset accumulator is left untouched.
#[derive(Debug, Default)]
pub struct RoiFitRoutine {
    windows: BasisSlot<RoiWindows>,
}

impl RoiFitRoutine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FitRoutine for RoiFitRoutine {
    fn kind(&self) -> FittingRoutineKind {
        FittingRoutineKind::Roi
    }

    fn initialize(
        &self,
        model: &FitModel,
        elements: &ElementsToFit,
        energy_range: EnergyRange,
    ) -> XrfResult<()> {
        let calibration = model.calibration();
        calibration.validate()?;
        let shape = model.peak_shape();

        let mut windows = Vec::with_capacity(elements.len());
        for element in elements.iter() {
            let Some(line) = element.strongest_line() else {
                continue;
            };
            let half_width = shape.fwhm(line.energy);
            let lo = calibration.channel_for_energy(line.energy - half_width).round();
            let hi = calibration.channel_for_energy(line.energy + half_width).round();
            let min = lo.max(energy_range.min as f64) as usize;
            let max = hi.min(energy_range.max as f64);
            if max < min as f64 {
                tracing::warn!(
                    element = element.name(),
                    line = line.label,
                    window = %energy_range,
                    "region of interest lies outside the fit window, skipping"
                );
                continue;
            }
            windows.push(RoiWindow {
                name: element.name().to_string(),
                min,
                max: max as usize,
            });
        }

        self.windows.install(RoiWindows {
            energy_range,
            windows,
        });
        Ok(())
    }

    fn fit_spectra(
        &self,
        _model: &FitModel,
        spectrum: &[f64],
        elements: &ElementsToFit,
    ) -> XrfResult<FitOutcome> {
        let rois = self.windows.current(self.kind())?;
        rois.energy_range.ensure_fits(spectrum.len())?;

        let intensities = elements
            .iter()
            .filter_map(|element| {
                let window = rois
                    .windows
                    .iter()
                    .find(|window| window.name == element.name())?;
                let counts: f64 = spectrum[window.min..=window.max].iter().sum();
                Some((window.name.clone(), counts))
            })
            .collect();

        Ok(finalize(FitOutcome {
            status: OptimizerOutcome::Converged,
            intensities,
            iterations: 0,
            residual: 0.0,
        }))
    }

    fn energy_range(&self) -> Option<EnergyRange> {
        self.windows.peek().map(|rois| rois.energy_range)
    }
}
