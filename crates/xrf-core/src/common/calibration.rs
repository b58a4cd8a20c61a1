//! Quadratic energy-per-channel calibration of a detector.

use crate::domain::{EnergyRange, XrfError, XrfResult};
use crate::fitting::params::{ENERGY_OFFSET, ENERGY_QUADRATIC, ENERGY_SLOPE, FitParameters};
use serde::{Deserialize, Serialize};

const QUADRATIC_EPSILON: f64 = 1.0e-15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyCalibration {
    pub offset: f64,
    pub slope: f64,
    pub quadratic: f64,
}

impl Default for EnergyCalibration {
    fn default() -> Self {
        Self {
            offset: 0.0,
            slope: 0.01,
            quadratic: 0.0,
        }
    }
}

impl EnergyCalibration {
    pub const fn new(offset: f64, slope: f64, quadratic: f64) -> Self {
        Self {
            offset,
            slope,
            quadratic,
        }
    }

    /// Reads `ENERGY_OFFSET`, `ENERGY_SLOPE` and `ENERGY_QUADRATIC`, falling
    /// back to the defaults for absent entries.
    pub fn from_parameters(params: &FitParameters) -> Self {
        let defaults = Self::default();
        Self {
            offset: params.value(ENERGY_OFFSET).unwrap_or(defaults.offset),
            slope: params.value(ENERGY_SLOPE).unwrap_or(defaults.slope),
            quadratic: params.value(ENERGY_QUADRATIC).unwrap_or(defaults.quadratic),
        }
    }

    pub fn validate(&self) -> XrfResult<()> {
        let finite = self.offset.is_finite() && self.slope.is_finite() && self.quadratic.is_finite();
        if !finite || self.slope <= 0.0 {
            return Err(XrfError::input_validation(
                "INPUT.CALIBRATION",
                format!(
                    "energy calibration requires finite coefficients and a positive slope (offset={}, slope={}, quadratic={})",
                    self.offset, self.slope, self.quadratic
                ),
            ));
        }
        Ok(())
    }

    pub fn energy_at(&self, channel: f64) -> f64 {
        self.offset + self.slope * channel + self.quadratic * channel * channel
    }

    /// Local channel width dE/dch.
    pub fn channel_width(&self, channel: f64) -> f64 {
        self.slope + 2.0 * self.quadratic * channel
    }

    pub fn channel_for_energy(&self, energy: f64) -> f64 {
        if self.quadratic.abs() <= QUADRATIC_EPSILON {
            return (energy - self.offset) / self.slope;
        }

        let discriminant =
            self.slope * self.slope - 4.0 * self.quadratic * (self.offset - energy);
        if discriminant < 0.0 {
            return (energy - self.offset) / self.slope;
        }
        (-self.slope + discriminant.sqrt()) / (2.0 * self.quadratic)
    }

    /// Channel window covering `[min_energy, max_energy]` keV, clamped to the
    /// detector's `channels`.
    pub fn energy_range(
        &self,
        min_energy: f64,
        max_energy: f64,
        channels: usize,
    ) -> XrfResult<EnergyRange> {
        self.validate()?;
        if channels == 0 {
            return Err(XrfError::input_validation(
                "INPUT.ENERGY_RANGE",
                "cannot derive an energy range for a detector with no channels",
            ));
        }

        let last = (channels - 1) as f64;
        let min = self.channel_for_energy(min_energy).round().clamp(0.0, last) as usize;
        let max = self.channel_for_energy(max_energy).round().clamp(0.0, last) as usize;
        EnergyRange::new(min, max)
    }
}
