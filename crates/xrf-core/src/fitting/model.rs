use super::element_models::PeakShape;
use super::params::{FitParameters, SNIP_WIDTH};
use crate::common::EnergyCalibration;
use crate::overrides::BranchingRatioTable;

/// Fit parameters together with the branching overrides of a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitModel {
    parameters: FitParameters,
    branching: BranchingRatioTable,
}

impl FitModel {
    pub fn new(parameters: FitParameters, branching: BranchingRatioTable) -> Self {
        Self {
            parameters,
            branching,
        }
    }

    pub fn parameters(&self) -> &FitParameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut FitParameters {
        &mut self.parameters
    }

    pub fn branching(&self) -> &BranchingRatioTable {
        &self.branching
    }

    pub fn calibration(&self) -> EnergyCalibration {
        EnergyCalibration::from_parameters(&self.parameters)
    }

    pub fn peak_shape(&self) -> PeakShape {
        PeakShape::from_parameters(&self.parameters)
    }

    /// Configured SNIP width, `None` when background subtraction is disabled.
    pub fn snip_width(&self) -> Option<f64> {
        self.parameters
            .value(SNIP_WIDTH)
            .filter(|width| width.is_finite() && *width > 0.0)
    }
}
