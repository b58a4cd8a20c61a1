//! Dataset-wide sums of fitted model and background spectra.

use crate::domain::{XrfError, XrfResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedSpectra {
    pub fitted: Vec<f64>,
    pub background: Vec<f64>,
}

impl IntegratedSpectra {
    fn zeros(len: usize) -> Self {
        Self {
            fitted: vec![0.0; len],
            background: vec![0.0; len],
        }
    }
}

/// Running sums shared by every worker of a run. Additions are serialised by
/// one lock held only for the element-wise add; there is no removal.
#[derive(Debug)]
pub struct SpectraAccumulator {
    len: usize,
    sums: Mutex<IntegratedSpectra>,
}

impl SpectraAccumulator {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            sums: Mutex::new(IntegratedSpectra::zeros(len)),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn add(&self, model: &[f64]) -> XrfResult<()> {
        self.ensure_len(model.len())?;
        let mut sums = self.sums.lock();
        add_finite(&mut sums.fitted, model);
        Ok(())
    }

    pub fn add_background(&self, background: &[f64]) -> XrfResult<()> {
        self.ensure_len(background.len())?;
        let mut sums = self.sums.lock();
        add_finite(&mut sums.background, background);
        Ok(())
    }

    /// Adds one pixel's model and background under a single lock.
    pub fn add_pixel(&self, model: &[f64], background: &[f64]) -> XrfResult<()> {
        self.ensure_len(model.len())?;
        self.ensure_len(background.len())?;
        let mut sums = self.sums.lock();
        add_finite(&mut sums.fitted, model);
        add_finite(&mut sums.background, background);
        Ok(())
    }

    pub fn snapshot(&self) -> IntegratedSpectra {
        self.sums.lock().clone()
    }

    fn ensure_len(&self, actual: usize) -> XrfResult<()> {
        if actual != self.len {
            return Err(XrfError::computation(
                "RUN.ACCUMULATOR",
                format!(
                    "accumulator spans {} channels but received {}",
                    self.len, actual
                ),
            ));
        }
        Ok(())
    }
}

fn add_finite(sum: &mut [f64], values: &[f64]) {
    for (slot, value) in sum.iter_mut().zip(values) {
        if value.is_finite() {
            *slot += *value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SpectraAccumulator;
    use std::sync::Arc;
    use std::thread;

    fn pixel_model(seed: usize, len: usize) -> Vec<f64> {
        (0..len)
            .map(|channel| ((seed * 31 + channel * 7) % 97) as f64 * 0.25)
            .collect()
    }

    #[test]
    fn concurrent_additions_match_serial_sum() {
        const LEN: usize = 64;
        const PIXELS: usize = 200;

        let serial = SpectraAccumulator::new(LEN);
        for seed in 0..PIXELS {
            serial
                .add_pixel(&pixel_model(seed, LEN), &pixel_model(seed + 1, LEN))
                .expect("serial add");
        }

        let shared = Arc::new(SpectraAccumulator::new(LEN));
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for seed in (worker..PIXELS).step_by(4).rev() {
                        shared.add(&pixel_model(seed, LEN)).expect("add model");
                        shared
                            .add_background(&pixel_model(seed + 1, LEN))
                            .expect("add background");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker should finish");
        }

        let expected = serial.snapshot();
        let actual = shared.snapshot();
        for channel in 0..LEN {
            assert!((expected.fitted[channel] - actual.fitted[channel]).abs() <= 1.0e-9);
            assert!((expected.background[channel] - actual.background[channel]).abs() <= 1.0e-9);
        }
    }

    #[test]
    fn non_finite_values_are_excluded() {
        let accumulator = SpectraAccumulator::new(3);
        accumulator
            .add(&[1.0, f64::NAN, f64::INFINITY])
            .expect("add");
        accumulator.add(&[1.0, 2.0, 3.0]).expect("add");
        assert_eq!(accumulator.snapshot().fitted, vec![2.0, 2.0, 3.0]);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let accumulator = SpectraAccumulator::new(3);
        let error = accumulator.add(&[1.0, 2.0]).expect_err("short model");
        assert_eq!(error.placeholder(), "RUN.ACCUMULATOR");
        assert!(accumulator.add_pixel(&[1.0; 3], &[1.0; 4]).is_err());
        assert_eq!(accumulator.snapshot().fitted, vec![0.0; 3]);
    }
}
