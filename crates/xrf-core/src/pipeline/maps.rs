use crate::fitting::params::{NUM_ITR, RESIDUAL};
use crate::fitting::{ElementsToFit, FitOutcome};
use serde::{Deserialize, Serialize};

/// One row-major `height x width` image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementMap {
    pub name: String,
    pub values: Vec<f64>,
}

/// Per-element intensity images plus the `NUM_ITR` and `RESIDUAL` diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementMaps {
    pub height: usize,
    pub width: usize,
    pub maps: Vec<ElementMap>,
}

impl ElementMaps {
    pub fn new(height: usize, width: usize, elements: &ElementsToFit) -> Self {
        let pixels = height * width;
        let maps = elements
            .names()
            .into_iter()
            .chain([NUM_ITR.to_string(), RESIDUAL.to_string()])
            .map(|name| ElementMap {
                name,
                values: vec![0.0; pixels],
            })
            .collect();
        Self {
            height,
            width,
            maps,
        }
    }

    pub fn record(&mut self, row: usize, col: usize, outcome: &FitOutcome) {
        let index = row * self.width + col;
        for (name, value) in outcome.counts() {
            if let Some(map) = self.maps.iter_mut().find(|map| map.name == name) {
                if let Some(slot) = map.values.get_mut(index) {
                    *slot = value;
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ElementMap> {
        self.maps.iter().find(|map| map.name == name)
    }

    pub fn value(&self, name: &str, row: usize, col: usize) -> Option<f64> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.get(name)
            .and_then(|map| map.values.get(row * self.width + col))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::ElementMaps;
    use crate::domain::OptimizerOutcome;
    use crate::fitting::params::{NUM_ITR, RESIDUAL};
    use crate::fitting::{ElementsToFit, FitOutcome};

    #[test]
    fn outcomes_land_in_their_pixel() {
        let elements = ElementsToFit::resolve(["Fe", "Cu"]);
        let mut maps = ElementMaps::new(2, 3, &elements);
        let names: Vec<&str> = maps.maps.iter().map(|map| map.name.as_str()).collect();
        assert_eq!(names, ["Fe", "Cu", NUM_ITR, RESIDUAL]);

        maps.record(
            1,
            2,
            &FitOutcome {
                status: OptimizerOutcome::Converged,
                intensities: vec![("Fe".to_string(), 7.0), ("Cu".to_string(), 3.0)],
                iterations: 4,
                residual: 0.25,
            },
        );
        assert_eq!(maps.value("Fe", 1, 2), Some(7.0));
        assert_eq!(maps.value("Cu", 1, 2), Some(3.0));
        assert_eq!(maps.value(NUM_ITR, 1, 2), Some(4.0));
        assert_eq!(maps.value(RESIDUAL, 1, 2), Some(0.25));
        assert_eq!(maps.value("Fe", 0, 0), Some(0.0));
        assert_eq!(maps.value("Fe", 2, 0), None);
    }
}
