//! SNIP continuum estimation.
//!
//! The spectrum is boxcar smoothed and mapped through `ln(ln(x + 1) + 1)`.
//! Each pass replaces a channel by the mean of its neighbours `w` channels away
//! when that mean is lower. `w` follows the detector FWHM at the channel's
//! energy scaled by the SNIP width: two passes at full width, then passes with
//! the width shrinking by sqrt(2) until it drops below half a channel.

use crate::common::EnergyCalibration;
use crate::common::constants::{FWHM_PER_SIGMA, SILICON_PAIR_ENERGY_KEV, SNIP_FWHM_SCALE, SQRT_TWO};
use crate::domain::XrfError;

const SMOOTHING_WIDTH: usize = 5;
const FULL_WIDTH_PASSES: usize = 2;
const MIN_WINDOW_CHANNELS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackgroundError {
    #[error("background estimation requires a non-empty spectrum")]
    EmptySpectrum,
    #[error("background estimation requires a positive energy slope, got {slope}")]
    InvalidCalibration { slope: f64 },
    #[error("background window {min}..={max} does not fit a spectrum of {len} channels")]
    WindowOutOfRange { min: usize, max: usize, len: usize },
}

impl From<BackgroundError> for XrfError {
    fn from(error: BackgroundError) -> Self {
        match error {
            BackgroundError::InvalidCalibration { .. } => {
                XrfError::input_validation("INPUT.BACKGROUND_CALIBRATION", error.to_string())
            }
            BackgroundError::EmptySpectrum | BackgroundError::WindowOutOfRange { .. } => {
                XrfError::computation("RUN.BACKGROUND_WINDOW", error.to_string())
            }
        }
    }
}

/// Estimates the continuum under `spectrum`. Clipping is confined to channels
/// `range_min..=range_max`; the output has the input's length, is non-negative,
/// and never exceeds a non-negative input channel.
pub fn snip_background(
    spectrum: &[f64],
    calibration: &EnergyCalibration,
    snip_width: f64,
    range_min: usize,
    range_max: usize,
) -> Result<Vec<f64>, BackgroundError> {
    let len = spectrum.len();
    if len == 0 {
        return Err(BackgroundError::EmptySpectrum);
    }
    if !(calibration.slope.is_finite() && calibration.slope > 0.0) {
        return Err(BackgroundError::InvalidCalibration {
            slope: calibration.slope,
        });
    }
    if range_min > range_max || range_max >= len {
        return Err(BackgroundError::WindowOutOfRange {
            min: range_min,
            max: range_max,
            len,
        });
    }

    let width = if snip_width.is_finite() {
        snip_width.max(0.0)
    } else {
        0.0
    };
    let offset_term = (calibration.offset / FWHM_PER_SIGMA).powi(2);
    let mut current_width: Vec<f64> = (0..len)
        .map(|channel| {
            let energy = calibration.energy_at(channel as f64);
            let variance = (offset_term + energy * SILICON_PAIR_ENERGY_KEV).max(0.0);
            width * SNIP_FWHM_SCALE * variance.sqrt() / calibration.slope
        })
        .collect();

    let mut background: Vec<f64> = boxcar_smooth(spectrum, SMOOTHING_WIDTH)
        .into_iter()
        .map(|value| (value.max(0.0) + 1.0).ln().ln_1p())
        .collect();

    for _ in 0..FULL_WIDTH_PASSES {
        snip_pass(&mut background, &current_width, range_min, range_max);
    }

    loop {
        let widest = current_width[range_min..=range_max]
            .iter()
            .copied()
            .fold(0.0_f64, f64::max);
        if widest < MIN_WINDOW_CHANNELS {
            break;
        }
        snip_pass(&mut background, &current_width, range_min, range_max);
        for value in &mut current_width {
            *value /= SQRT_TWO;
        }
    }

    Ok(background
        .into_iter()
        .zip(spectrum)
        .map(|(value, &original)| {
            let restored = value.exp_m1().exp() - 1.0;
            restored.max(0.0).min(original.max(0.0))
        })
        .collect())
}

fn snip_pass(background: &mut [f64], widths: &[f64], range_min: usize, range_max: usize) {
    let previous = background.to_vec();
    for channel in range_min..=range_max {
        let reach = widths[channel].max(0.0) as usize;
        let lo = channel.saturating_sub(reach).max(range_min);
        let hi = channel.saturating_add(reach).min(range_max);
        let neighbour_mean = 0.5 * (previous[lo] + previous[hi]);
        if background[channel] > neighbour_mean {
            background[channel] = neighbour_mean;
        }
    }
}

fn boxcar_smooth(spectrum: &[f64], width: usize) -> Vec<f64> {
    let half = width / 2;
    (0..spectrum.len())
        .map(|channel| {
            let lo = channel.saturating_sub(half);
            let hi = (channel + half).min(spectrum.len() - 1);
            let window = &spectrum[lo..=hi];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}
