//! Error types for the PhiSym reduction engine

use thiserror::Error;

/// PhiSym error type
#[derive(Error, Debug)]
pub enum Error {
    /// The miscalibration trial family is asymmetric, non-contiguous or absent
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Two arrays that must share a shape do not
    #[error("Shape mismatch for `{field}`: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        field: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Reduction axis outside the batch dimensions
    #[error("Invalid axis {axis} for a batch with {ndim} dimension(s)")]
    InvalidAxis { axis: usize, ndim: usize },

    /// Reduction along an axis of length zero
    #[error("Cannot reduce along empty axis {axis}")]
    EmptyAxis { axis: usize },

    /// Merge between two different record kinds
    #[error("Cannot combine {left} with {right}")]
    RecordMismatch { left: String, right: String },

    /// Geometry accessor that the record specialization does not expose
    #[error("{record} has no `{accessor}` accessor")]
    Accessor { accessor: &'static str, record: String },

    /// Heterogeneous number of sweep steps under the strict policy
    #[error("Non-uniform nmis across records: min {min}, max {max}")]
    NonUniformSweep { min: u32, max: u32 },

    /// Operation that needs at least one record
    #[error("Empty batch: {0}")]
    EmptyBatch(String),

    /// Array construction from a flat buffer failed
    #[error("Layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),

    /// Worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
