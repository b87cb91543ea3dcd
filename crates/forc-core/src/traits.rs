//! Core traits for FORC analysis
//!
//! The differentiator does not hard-code how a local fit's samples are
//! chosen; it asks a [`NeighborhoodSelector`]. Index-space and field-distance
//! selectors live in `forc-compute`.

use crate::{MeasurementSet, Sample};

/// Chooses the samples that feed a local fit centred at `(ha0, hb0)`.
pub trait NeighborhoodSelector: Send + Sync {
    /// Append the selected samples to `out` (which the caller clears).
    fn select(&self, data: &MeasurementSet, ha0: f64, hb0: f64, out: &mut Vec<Sample>);

    /// Selector name (e.g. "sample_index", "field_distance")
    fn name(&self) -> &str;
}
