//! Dataset loading, validation, and result serialization for culling.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::{Column, ColumnKind, Dataset, ExperimentName, Predictor};
pub use error::IoError;
pub use reader::{DatasetReader, read_json};
pub use writer::ResultWriter;
