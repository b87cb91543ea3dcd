//! # forc-core
//!
//! Core types for FORC (first-order reversal curve) analysis.
//!
//! This crate defines:
//! - the error taxonomy shared by every stage of the pipeline
//! - the immutable measurement data model (`Sample`, `ReversalCurve`, `MeasurementSet`)
//! - run configuration (`ForcConfig`, `ExtractConfig`, `PreprocessConfig`)
//! - the `NeighborhoodSelector` trait used by the differentiator
//!
//! ## Architecture
//!
//! Numerical stages live in `forc-compute` and depend only on the types here,
//! never on a caller (CLI, GUI, file format).

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types.
pub mod error;
/// Measurement data model.
pub mod measurement;
/// Neighborhood selection seam.
pub mod traits;
/// Configuration and result types.
pub mod types;

pub use error::{Error, Result};
pub use measurement::{ExtractionWarning, MeasurementSet, ReversalCurve, Sample};
pub use traits::NeighborhoodSelector;
pub use types::{
    DriftCorrection, ExtractConfig, FieldExtent, ForcConfig, ForcResult, NeighborhoodPolicy,
    PreprocessConfig, SlopeCorrection,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
