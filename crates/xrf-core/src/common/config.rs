//! Run configuration loaded from a JSON document.

use super::constants::DEFAULT_MAX_ITERATIONS;
use crate::domain::{FittingRoutineKind, XrfError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FitRunConfig {
    pub routine: FittingRoutineKind,
    pub max_iterations: usize,
    /// Worker threads for the scan pool; 0 uses every available core.
    pub workers: usize,
    pub detector_number: u32,
}

impl Default for FitRunConfig {
    fn default() -> Self {
        Self {
            routine: FittingRoutineKind::Nnls,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            workers: 0,
            detector_number: 0,
        }
    }
}

impl FitRunConfig {
    pub fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FitRunConfigError {
    #[error("failed to read run configuration '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse run configuration '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<FitRunConfigError> for XrfError {
    fn from(error: FitRunConfigError) -> Self {
        match &error {
            FitRunConfigError::Read { .. } => XrfError::io_system("IO.RUN_CONFIG", error.to_string()),
            FitRunConfigError::Parse { .. } => {
                XrfError::input_validation("INPUT.RUN_CONFIG", error.to_string())
            }
        }
    }
}

pub fn load_fit_run_config(
    config_path: impl AsRef<Path>,
) -> Result<FitRunConfig, FitRunConfigError> {
    let config_path = config_path.as_ref();
    let source = fs::read_to_string(config_path).map_err(|source| FitRunConfigError::Read {
        path: config_path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|source| FitRunConfigError::Parse {
        path: config_path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::{FitRunConfig, FitRunConfigError, load_fit_run_config};
    use crate::domain::{FittingRoutineKind, XrfError, XrfErrorCategory};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("run.json");
        fs::write(&path, r#"{ "routine": "svd", "workers": 3 }"#).expect("write config");

        let config = load_fit_run_config(&path).expect("config should load");
        assert_eq!(config.routine, FittingRoutineKind::Svd);
        assert_eq!(config.workers, 3);
        assert_eq!(config.resolved_workers(), 3);
        assert_eq!(config.max_iterations, FitRunConfig::default().max_iterations);
    }

    #[test]
    fn zero_workers_resolves_to_available_cores() {
        let config = FitRunConfig::default();
        assert!(config.resolved_workers() >= 1);
    }

    #[test]
    fn missing_and_malformed_files_map_to_categories() {
        let temp = TempDir::new().expect("tempdir should be created");
        let missing = load_fit_run_config(temp.path().join("absent.json"))
            .expect_err("missing file should fail");
        assert!(matches!(missing, FitRunConfigError::Read { .. }));
        assert_eq!(
            XrfError::from(missing).category(),
            XrfErrorCategory::IoSystemError
        );

        let path = temp.path().join("bad.json");
        fs::write(&path, r#"{ "routine": "gauss" }"#).expect("write config");
        let malformed = load_fit_run_config(&path).expect_err("unknown routine should fail");
        assert!(matches!(malformed, FitRunConfigError::Parse { .. }));
        assert_eq!(
            XrfError::from(malformed).category(),
            XrfErrorCategory::InputValidationError
        );
    }
}
