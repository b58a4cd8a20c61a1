//! Named fit parameters kept in insertion order.

use serde::{Deserialize, Serialize};

pub const ENERGY_OFFSET: &str = "ENERGY_OFFSET";
pub const ENERGY_SLOPE: &str = "ENERGY_SLOPE";
pub const ENERGY_QUADRATIC: &str = "ENERGY_QUADRATIC";
pub const FWHM_OFFSET: &str = "FWHM_OFFSET";
pub const FWHM_FANOPRIME: &str = "FWHM_FANOPRIME";
pub const SNIP_WIDTH: &str = "SNIP_WIDTH";
pub const NUM_ITR: &str = "NUM_ITR";
pub const RESIDUAL: &str = "RESIDUAL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundKind {
    Fixed,
    LimitedLowHigh,
    LimitedLow,
    LimitedHigh,
    Fit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParam {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub bound: BoundKind,
}

impl FitParam {
    pub fn new(name: impl Into<String>, value: f64, min: f64, max: f64, bound: BoundKind) -> Self {
        Self {
            name: name.into(),
            value,
            min,
            max,
            bound,
        }
    }

    pub fn fixed(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, value, value, BoundKind::Fixed)
    }

    pub fn fit(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, f64::NEG_INFINITY, f64::INFINITY, BoundKind::Fit)
    }

    pub fn is_fit_enabled(&self) -> bool {
        !matches!(self.bound, BoundKind::Fixed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitParameters {
    params: Vec<FitParam>,
}

impl FitParameters {
    /// Inserts `param`, replacing an existing entry of the same name in place.
    pub fn add_parameter(&mut self, param: FitParam) {
        match self.params.iter_mut().find(|existing| existing.name == param.name) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FitParam> {
        self.params.iter().find(|param| param.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|param| param.value)
    }

    pub fn set_value(&mut self, name: &str, value: f64) -> bool {
        match self.params.iter_mut().find(|param| param.name == name) {
            Some(param) => {
                param.value = value;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FitParam> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
