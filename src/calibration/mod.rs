//! Calibration stages run on a white image: pitch, extraction, refinement,
//! sorting and grid fitting.
pub mod extractor;
pub mod fitter;
pub(crate) mod lm;
pub mod nms;
pub mod pitch;
pub mod refiner;
pub mod sorter;

pub use extractor::{CentroidExtractor, Extraction};
pub use fitter::{GridFit, GridFitter};
pub use pitch::{PitchEstimate, PitchEstimator};
pub use refiner::CentroidRefiner;
pub use sorter::{CentroidSorter, LatticeLayout, StepPolicy};
