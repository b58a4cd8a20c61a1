pub mod calibration;
pub mod config;
pub mod constants;
pub mod elements;

pub use calibration::EnergyCalibration;
pub use config::{FitRunConfig, FitRunConfigError, load_fit_run_config};
pub use elements::{
    ElementLine, EmissionShell, FitElement, K_LINE_COUNT, L_LINE_COUNT, atomic_number_for_symbol,
    element_symbol,
};
