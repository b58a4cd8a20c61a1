//! Detector and peak-shape constants shared by the background estimator and the
//! element basis generator.

/// FWHM = `FWHM_PER_SIGMA` * sigma for a Gaussian.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3_f64;
/// Rounded factor used by the SNIP window schedule.
pub const SNIP_FWHM_SCALE: f64 = 2.35_f64;
/// Fano-scaled pair creation energy (keV) of the detector FWHM model.
pub const SILICON_PAIR_ENERGY_KEV: f64 = 2.96e-3_f64;
pub const SQRT_TWO_PI: f64 = 2.506_628_274_631_000_5_f64;
pub const SQRT_TWO: f64 = 1.414_22_f64;

pub const DEFAULT_FWHM_OFFSET_KEV: f64 = 0.12_f64;
pub const DEFAULT_FWHM_FANOPRIME: f64 = 0.114_f64;
pub const DEFAULT_MAX_ITERATIONS: usize = 200;
