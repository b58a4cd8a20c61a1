pub mod errors;

pub use errors::{XrfError, XrfErrorCategory, XrfResult};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Detector counts, one value per energy channel.
pub type Spectrum = Vec<f64>;

/// Inclusive channel window `min..=max` shared by every spectrum, basis curve
/// and fit matrix of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnergyRange {
    pub min: usize,
    pub max: usize,
}

impl EnergyRange {
    pub fn new(min: usize, max: usize) -> XrfResult<Self> {
        if max < min {
            return Err(XrfError::input_validation(
                "INPUT.ENERGY_RANGE",
                format!("energy range max {} is below min {}", max, min),
            ));
        }
        Ok(Self { min, max })
    }

    /// Window covering every channel of a `channels`-long spectrum.
    pub fn full(channels: usize) -> XrfResult<Self> {
        if channels == 0 {
            return Err(XrfError::input_validation(
                "INPUT.ENERGY_RANGE",
                "cannot build an energy range over an empty spectrum",
            ));
        }
        Self::new(0, channels - 1)
    }

    pub const fn count(&self) -> usize {
        self.max - self.min + 1
    }

    pub fn contains(&self, channel: usize) -> bool {
        (self.min..=self.max).contains(&channel)
    }

    /// Borrow the window out of a full-length spectrum.
    pub fn segment<'a>(&self, spectrum: &'a [f64]) -> XrfResult<&'a [f64]> {
        self.ensure_fits(spectrum.len())?;
        Ok(&spectrum[self.min..=self.max])
    }

    pub fn ensure_fits(&self, spectrum_len: usize) -> XrfResult<()> {
        if self.max >= spectrum_len {
            return Err(XrfError::computation(
                "RUN.FIT_WINDOW",
                format!(
                    "fit window {}..={} exceeds spectrum length {}",
                    self.min, self.max, spectrum_len
                ),
            ));
        }
        Ok(())
    }
}

impl Display for EnergyRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// Fitting strategy installed for a dataset. The numeric ids are the routine
/// type ids carried by the streaming wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FittingRoutineKind {
    Roi,
    Svd,
    Nnls,
}

impl FittingRoutineKind {
    pub const ALL: [Self; 3] = [Self::Roi, Self::Svd, Self::Nnls];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Roi => "ROI",
            Self::Svd => "SVD",
            Self::Nnls => "NNLS",
        }
    }

    pub const fn wire_id(self) -> u32 {
        match self {
            Self::Roi => 1,
            Self::Svd => 8,
            Self::Nnls => 16,
        }
    }

    pub fn from_wire_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_id() == id)
    }
}

impl Display for FittingRoutineKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

impl FromStr for FittingRoutineKind {
    type Err = XrfError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                XrfError::input_validation(
                    "INPUT.FIT_ROUTINE",
                    format!("unknown fitting routine '{}'; expected roi, svd or nnls", value),
                )
            })
    }
}

/// Per-pixel optimizer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptimizerOutcome {
    Converged,
    Exhausted,
    Failed,
}

impl OptimizerOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Converged => "CONVERGED",
            Self::Exhausted => "EXHAUSTED",
            Self::Failed => "FAILED",
        }
    }
}

impl Display for OptimizerOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}
