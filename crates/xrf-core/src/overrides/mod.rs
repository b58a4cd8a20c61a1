pub mod branching;
pub mod params_override;

pub use branching::{BranchingKind, BranchingParseError, BranchingRatioTable};
pub use params_override::{ParamsOverride, ParamsOverrideError, load_params_override};
