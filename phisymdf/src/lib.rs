//! Schema mapping, dataset I/O and the reduction pipeline for PhiSym files.

pub mod error;
pub mod dataset;
pub mod schema;
pub mod output;
pub mod pipeline;

pub use error::{Error, Result};
