//! Per-element synthetic response curves over the fit window.

use super::model::FitModel;
use super::params::{FWHM_FANOPRIME, FWHM_OFFSET, FitParameters};
use crate::common::constants::{
    DEFAULT_FWHM_FANOPRIME, DEFAULT_FWHM_OFFSET_KEV, FWHM_PER_SIGMA, SILICON_PAIR_ENERGY_KEV,
    SQRT_TWO_PI,
};
use crate::common::{EnergyCalibration, FitElement};
use crate::domain::EnergyRange;

/// Detector peak broadening as a function of line energy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakShape {
    pub fwhm_offset: f64,
    pub fwhm_fanoprime: f64,
}

impl Default for PeakShape {
    fn default() -> Self {
        Self {
            fwhm_offset: DEFAULT_FWHM_OFFSET_KEV,
            fwhm_fanoprime: DEFAULT_FWHM_FANOPRIME,
        }
    }
}

impl PeakShape {
    pub fn from_parameters(params: &FitParameters) -> Self {
        let defaults = Self::default();
        Self {
            fwhm_offset: params.value(FWHM_OFFSET).unwrap_or(defaults.fwhm_offset),
            fwhm_fanoprime: params.value(FWHM_FANOPRIME).unwrap_or(defaults.fwhm_fanoprime),
        }
    }

    pub fn sigma(&self, energy: f64) -> f64 {
        let electronic = self.fwhm_offset / FWHM_PER_SIGMA;
        (electronic * electronic + energy * SILICON_PAIR_ENERGY_KEV * self.fwhm_fanoprime)
            .max(0.0)
            .sqrt()
    }

    pub fn fwhm(&self, energy: f64) -> f64 {
        self.sigma(energy) * FWHM_PER_SIGMA
    }

    /// Counts deposited in a channel of width `channel_width` centred on
    /// `channel_energy` by a unit-area line at `line_energy`.
    pub fn channel_response(&self, line_energy: f64, channel_energy: f64, channel_width: f64) -> f64 {
        let sigma = self.sigma(line_energy);
        if !(sigma.is_finite() && sigma > 0.0) {
            return 0.0;
        }
        let z = (channel_energy - line_energy) / sigma;
        channel_width * (-0.5 * z * z).exp() / (sigma * SQRT_TWO_PI)
    }
}

/// The elements selected for fitting, resolved against the line tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementsToFit {
    elements: Vec<FitElement>,
}

impl ElementsToFit {
    /// Resolves fit names in order. Unknown or duplicated names are reported and
    /// skipped.
    pub fn resolve<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut elements: Vec<FitElement> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            match FitElement::parse(name) {
                Some(element) if elements.iter().any(|known| known.name() == element.name()) => {
                    tracing::warn!(element = name, "duplicate element in fit list, skipping");
                }
                Some(element) => elements.push(element),
                None => tracing::warn!(element = name, "unknown element, skipping"),
            }
        }
        Self { elements }
    }

    pub fn from_elements(elements: Vec<FitElement>) -> Self {
        Self { elements }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FitElement> {
        self.elements.iter()
    }

    pub fn get(&self, name: &str) -> Option<&FitElement> {
        self.elements.iter().find(|element| element.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.elements
            .iter()
            .map(|element| element.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Named basis curves in insertion order. Every curve spans the fit window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementModelSet {
    models: Vec<(String, Vec<f64>)>,
}

impl ElementModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a curve, replacing the curve of an existing name in place.
    pub fn insert(&mut self, name: impl Into<String>, curve: Vec<f64>) {
        let name = name.into();
        match self.models.iter_mut().find(|(known, _)| *known == name) {
            Some((_, existing)) => *existing = curve,
            None => self.models.push((name, curve)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.models
            .iter()
            .find(|(known, _)| known == name)
            .map(|(_, curve)| curve.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.models
            .iter()
            .map(|(name, curve)| (name.as_str(), curve.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Synthesises one unit-intensity response per element over `energy_range`.
pub fn generate_element_models(
    model: &FitModel,
    elements: &ElementsToFit,
    energy_range: EnergyRange,
) -> ElementModelSet {
    let calibration = model.calibration();
    let shape = model.peak_shape();
    let mut models = ElementModelSet::new();

    for element in elements.iter() {
        let curve = element_response(element, model, &calibration, &shape, energy_range);
        if curve.iter().all(|value| *value == 0.0) {
            tracing::debug!(
                element = element.name(),
                window = %energy_range,
                "element has no response inside the fit window"
            );
        }
        models.insert(element.name(), curve);
    }
    models
}

fn element_response(
    element: &FitElement,
    model: &FitModel,
    calibration: &EnergyCalibration,
    shape: &PeakShape,
    energy_range: EnergyRange,
) -> Vec<f64> {
    let lines = element.lines();
    (energy_range.min..=energy_range.max)
        .map(|channel| {
            let channel = channel as f64;
            let energy = calibration.energy_at(channel);
            let width = calibration.channel_width(channel);
            lines
                .iter()
                .map(|line| {
                    let factor = model.branching().factor(element.name(), line.slot);
                    line.ratio * factor * shape.channel_response(line.energy, energy, width)
                })
                .sum::<f64>()
        })
        .collect()
}
