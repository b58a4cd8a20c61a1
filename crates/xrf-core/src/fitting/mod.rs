pub mod accumulator;
pub mod background;
pub mod element_models;
pub mod matrix;
pub mod model;
pub mod params;
pub mod routines;

pub use accumulator::{IntegratedSpectra, SpectraAccumulator};
pub use background::{BackgroundError, snip_background};
pub use element_models::{ElementModelSet, ElementsToFit, PeakShape, generate_element_models};
pub use matrix::{ColumnIndex, FitMatrix};
pub use model::FitModel;
pub use params::{BoundKind, FitParam, FitParameters};
pub use routines::{
    FitOutcome, FitRoutine, NnlsFitRoutine, RoiFitRoutine, SvdFitRoutine, generate_fit_routine,
};
