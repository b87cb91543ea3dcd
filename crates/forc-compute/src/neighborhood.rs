//! Neighborhood selectors for the local fits.
//!
//! [`SampleIndexSelector`] works in sample-index space: the window is
//! `2 * smoothing_factor + 1` curves by `2 * smoothing_factor + 1` readings
//! around the location, so its size in field units follows the local sampling
//! density. [`FieldDistanceSelector`] takes every sample within a fixed field
//! radius instead.

use forc_core::{MeasurementSet, NeighborhoodPolicy, NeighborhoodSelector, Sample};

/// Index-space window around the curve nearest in `hb` and, per curve, the reading nearest in `ha`.
///
/// A curve contributes only if its nearest reading lies within `reach` of `ha0`,
/// so curves that start beyond the location add nothing at the measurement edge.
#[derive(Debug, Clone, Copy)]
pub struct SampleIndexSelector {
    half_width: usize,
    reach: f64,
}

impl SampleIndexSelector {
    /// Window of `half_width` indices each side; curves whose nearest reading is
    /// farther than `reach` are skipped.
    pub fn new(half_width: usize, reach: f64) -> Self {
        Self { half_width, reach }
    }
}

impl NeighborhoodSelector for SampleIndexSelector {
    fn select(&self, data: &MeasurementSet, ha0: f64, hb0: f64, out: &mut Vec<Sample>) {
        let curves = data.curves();
        let center = data.nearest_curve(hb0);
        let lo = center.saturating_sub(self.half_width);
        let hi = (center + self.half_width).min(curves.len() - 1);

        for curve in &curves[lo..=hi] {
            let j = curve.nearest_index(ha0);
            if (curve.ha()[j] - ha0).abs() > self.reach {
                continue;
            }
            let j_lo = j.saturating_sub(self.half_width);
            let j_hi = (j + self.half_width).min(curve.len() - 1);
            out.extend((j_lo..=j_hi).map(|k| curve.sample(k)));
        }
    }

    fn name(&self) -> &str {
        "sample_index"
    }
}

/// Every sample within Euclidean distance `radius` in (ha, hb).
#[derive(Debug, Clone, Copy)]
pub struct FieldDistanceSelector {
    radius: f64,
}

impl FieldDistanceSelector {
    /// Select within `radius`.
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }
}

impl NeighborhoodSelector for FieldDistanceSelector {
    fn select(&self, data: &MeasurementSet, ha0: f64, hb0: f64, out: &mut Vec<Sample>) {
        let r = self.radius;
        let (lo, hi) = data.curve_range(hb0 - r, hb0 + r);
        for curve in &data.curves()[lo..hi] {
            let dy = curve.hb() - hb0;
            let reach = (r * r - dy * dy).max(0.0).sqrt();
            let (a, b) = curve.index_range(ha0 - reach, ha0 + reach);
            out.extend((a..b).map(|k| curve.sample(k)));
        }
    }

    fn name(&self) -> &str {
        "field_distance"
    }
}

/// Selector for `policy` with the given smoothing factor and search radius.
pub fn selector_for(
    policy: NeighborhoodPolicy,
    smoothing_factor: usize,
    search_radius: f64,
) -> Box<dyn NeighborhoodSelector> {
    match policy {
        NeighborhoodPolicy::SampleIndex => {
            Box::new(SampleIndexSelector::new(smoothing_factor, search_radius))
        }
        NeighborhoodPolicy::FieldDistance => Box::new(FieldDistanceSelector::new(search_radius)),
    }
}
