//! Reduction engine for ECAL PhiSym calibration data.
//!
//! Per-channel accumulators (`RecHit`) and per-run summaries (`Info`) are
//! held as batches of equally shaped columns and reduced field by field.

pub mod error;
pub mod config;

// detector records
pub mod ecal {
    pub mod geometry;
    pub mod rechit;
    pub mod info;
}

// algorithm module
pub mod algorithm {
    pub mod reduction;
    pub mod uncertainty;
    pub mod sweep;
}

pub use error::{Error, Result};
