//! Line-oriented `KEY: value` parameter override files.

use super::branching::BranchingRatioTable;
use crate::domain::{EnergyRange, XrfError, XrfResult};
use crate::fitting::element_models::ElementsToFit;
use crate::fitting::model::FitModel;
use crate::fitting::params::{
    ENERGY_OFFSET, ENERGY_QUADRATIC, ENERGY_SLOPE, FWHM_FANOPRIME, FWHM_OFFSET, FitParam,
    FitParameters, SNIP_WIDTH,
};
use std::fs;
use std::path::{Path, PathBuf};

const ELEMENTS_TO_FIT: &str = "ELEMENTS_TO_FIT";
const DETECTOR_ELEMENT: &str = "DETECTOR_ELEMENT";
const MIN_ENERGY_TO_FIT: &str = "MIN_ENERGY_TO_FIT";
const MAX_ENERGY_TO_FIT: &str = "MAX_ENERGY_TO_FIT";
const BRANCHING_FAMILY_ADJUSTMENT_L: &str = "BRANCHING_FAMILY_ADJUSTMENT_L";
const BRANCHING_RATIO_ADJUSTMENT_L: &str = "BRANCHING_RATIO_ADJUSTMENT_L";
const BRANCHING_RATIO_ADJUSTMENT_K: &str = "BRANCHING_RATIO_ADJUSTMENT_K";

/// File keys that map onto fit parameters.
const PARAMETER_KEYS: [(&str, &str); 6] = [
    ("CAL_OFFSET_[E_OFFSET]", ENERGY_OFFSET),
    ("CAL_SLOPE_[E_LINEAR]", ENERGY_SLOPE),
    ("CAL_QUAD_[E_QUADRATIC]", ENERGY_QUADRATIC),
    ("FWHM_OFFSET", FWHM_OFFSET),
    ("FWHM_FANOPRIME", FWHM_FANOPRIME),
    ("SNIP_WIDTH", SNIP_WIDTH),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamsOverride {
    pub fit_params: FitParameters,
    /// Element names in file order.
    pub elements_to_fit: Vec<String>,
    pub detector_element: Option<String>,
    pub min_energy: Option<f64>,
    pub max_energy: Option<f64>,
    pub branching_family_l: Vec<String>,
    pub branching_ratio_l: Vec<String>,
    pub branching_ratio_k: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParamsOverrideError {
    #[error("failed to read parameter override file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<ParamsOverrideError> for XrfError {
    fn from(error: ParamsOverrideError) -> Self {
        XrfError::io_system("IO.PARAMS_OVERRIDE", error.to_string())
    }
}

pub fn load_params_override(
    path: impl AsRef<Path>,
) -> Result<ParamsOverride, ParamsOverrideError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| ParamsOverrideError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ParamsOverride::parse(&source))
}

impl ParamsOverride {
    /// Parses override text. Blank and `#` lines are ignored, unknown keys are
    /// skipped, and unparsable values are reported and skipped.
    pub fn parse(source: &str) -> Self {
        let mut parsed = Self::default();
        for (index, raw) in source.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                tracing::debug!(line = index + 1, "override line without a key, ignoring");
                continue;
            };
            parsed.apply(index + 1, key.trim(), value.trim());
        }
        parsed
    }

    fn apply(&mut self, line: usize, key: &str, value: &str) {
        match key {
            ELEMENTS_TO_FIT => {
                for name in value.split(',').map(str::trim).filter(|name| !name.is_empty()) {
                    if !self.elements_to_fit.iter().any(|known| known == name) {
                        self.elements_to_fit.push(name.to_string());
                    }
                }
            }
            DETECTOR_ELEMENT => {
                if !value.is_empty() {
                    self.detector_element = Some(value.to_string());
                }
            }
            MIN_ENERGY_TO_FIT => self.min_energy = parse_number(line, key, value),
            MAX_ENERGY_TO_FIT => self.max_energy = parse_number(line, key, value),
            BRANCHING_FAMILY_ADJUSTMENT_L => self.branching_family_l.push(value.to_string()),
            BRANCHING_RATIO_ADJUSTMENT_L => self.branching_ratio_l.push(value.to_string()),
            BRANCHING_RATIO_ADJUSTMENT_K => self.branching_ratio_k.push(value.to_string()),
            _ => match PARAMETER_KEYS.iter().find(|(file_key, _)| *file_key == key) {
                Some((_, name)) => {
                    if let Some(number) = parse_number(line, key, value) {
                        self.fit_params.add_parameter(FitParam::fixed(*name, number));
                    }
                }
                None => tracing::debug!(line, key, "unknown override key, ignoring"),
            },
        }
    }

    pub fn branching_table(&self) -> BranchingRatioTable {
        BranchingRatioTable::from_entries(
            self.branching_family_l.as_slice(),
            self.branching_ratio_l.as_slice(),
            self.branching_ratio_k.as_slice(),
        )
    }

    pub fn fit_model(&self) -> FitModel {
        FitModel::new(self.fit_params.clone(), self.branching_table())
    }

    pub fn elements(&self) -> ElementsToFit {
        ElementsToFit::resolve(&self.elements_to_fit)
    }

    /// Fit window for a `channels`-long detector. Missing energy bounds fall
    /// back to the first and last channel.
    pub fn energy_range(&self, channels: usize) -> XrfResult<EnergyRange> {
        let full = EnergyRange::full(channels)?;
        let calibration = self.fit_model().calibration();
        calibration.validate()?;

        let min = match self.min_energy {
            Some(energy) => calibration.energy_range(energy, energy, channels)?.min,
            None => full.min,
        };
        let max = match self.max_energy {
            Some(energy) => calibration.energy_range(energy, energy, channels)?.max,
            None => full.max,
        };
        EnergyRange::new(min, max)
    }
}

fn parse_number(line: usize, key: &str, value: &str) -> Option<f64> {
    let token = value.split(',').next().unwrap_or_default().trim();
    match token.parse::<f64>() {
        Ok(number) if number.is_finite() => Some(number),
        _ => {
            tracing::warn!(line, key, value, "override value is not a finite number, skipping");
            None
        }
    }
}
