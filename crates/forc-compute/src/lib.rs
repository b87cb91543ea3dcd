//! # forc-compute
//!
//! Numerical pipeline for FORC distributions.
//!
//! Stages, in data-flow order:
//! - curve extraction (raw readings → `MeasurementSet`)
//! - optional preprocessing (drift, background slope, rescale)
//! - field-space grid (where local fits are evaluated, masked to the data hull)
//! - local-regression differentiation (`rho = -½ ∂²m/∂ha∂hb`)
//! - assembly onto (hc, hu) axes
//!
//! Each stage returns a new value and never mutates its input, so one
//! `MeasurementSet` can feed many runs with different smoothing factors.
//!
//! ## Parallelism
//!
//! Differentiation is a parallel map over grid points on a caller-built
//! [`ComputePool`]; cancellation is cooperative via [`CancelToken`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// (ha, hb) → (hc, hu) reprojection and normalization.
pub mod assemble;
/// Per-grid-point density estimation.
pub mod differentiate;
/// Grouping raw readings into reversal curves.
pub mod extract;
/// Regular evaluation lattice.
pub mod grid;
/// Convex hull of the measured region.
pub mod hull;
/// Local quadratic least-squares fit.
pub mod local_fit;
/// Neighborhood selectors.
pub mod neighborhood;
/// End-to-end runs.
pub mod pipeline;
/// Worker pool and cancellation.
pub mod pool;
/// Drift / slope / rescale corrections.
pub mod preprocess;

pub use assemble::{ForcDistribution, assemble};
pub use differentiate::{DensityMap, FitSettings, OutcomeCounts, PointOutcome, differentiate};
pub use extract::{extract, extract_sweeps};
pub use grid::{Grid, GridPoint, build_grid, build_grid_with_step};
pub use hull::DataHull;
pub use local_fit::{FitFailure, QuadraticFit, fit_quadratic};
pub use neighborhood::{FieldDistanceSelector, SampleIndexSelector, selector_for};
pub use pipeline::{ForcRun, RunDiagnostics, run, run_samples};
pub use pool::{CancelToken, ComputePool};
