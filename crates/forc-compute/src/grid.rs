//! Regular (ha, hb) lattice on which local fits are evaluated.
//!
//! The grid only says *where* the differentiator evaluates a fit; the values
//! always come from the irregular raw samples. A lattice point is valid when it
//! lies in the physical half plane (`ha >= hb`), inside the convex hull of the
//! measured region, and at least one sample lies within the search radius
//! `smoothing_factor * field_step`.

use forc_core::{Error, FieldExtent, MeasurementSet, Result};

use crate::hull::DataHull;

/// Lattice location plus validity flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    /// Index along the ha axis.
    pub i: usize,
    /// Index along the hb axis.
    pub j: usize,
    /// Applied field.
    pub ha: f64,
    /// Reversal field.
    pub hb: f64,
    /// Enough nearby samples to attempt a fit.
    pub valid: bool,
}

/// Square `resolution x resolution` lattice over the measured (ha, hb) box.
///
/// Flat index of point `(i, j)` is `j * resolution + i` (rows follow hb).
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    ha_axis: Vec<f64>,
    hb_axis: Vec<f64>,
    valid: Vec<bool>,
    extent: FieldExtent,
    hull: DataHull,
    field_step: f64,
    smoothing_factor: usize,
    search_radius: f64,
}

/// Lay out the lattice and flag points outside the data hull or with no sample within reach.
pub fn build_grid(
    data: &MeasurementSet,
    resolution: usize,
    smoothing_factor: usize,
) -> Result<Grid> {
    build_grid_with_step(data, resolution, smoothing_factor, None)
}

/// [`build_grid`] with an explicit field step; `None` uses the median applied-field step.
pub fn build_grid_with_step(
    data: &MeasurementSet,
    resolution: usize,
    smoothing_factor: usize,
    field_step: Option<f64>,
) -> Result<Grid> {
    if resolution < 2 {
        return Err(Error::Configuration(format!("resolution must be >= 2, got {resolution}")));
    }
    if smoothing_factor < 1 {
        return Err(Error::Configuration("smoothing_factor must be >= 1, got 0".to_string()));
    }
    let field_step = match field_step {
        Some(step) if step.is_finite() && step > 0.0 => step,
        Some(step) => {
            return Err(Error::Configuration(format!(
                "field_step must be finite and > 0, got {step}"
            )));
        }
        None => data.field_step().ok_or_else(|| {
            Error::MalformedInput("no curve has two readings; field step is undefined".to_string())
        })?,
    };

    let extent = data.extent();
    let ha_axis = linspace(extent.ha_min, extent.ha_max, resolution);
    let hb_axis = linspace(extent.hb_min, extent.hb_max, resolution);
    let search_radius = smoothing_factor as f64 * field_step;
    let hull = DataHull::of(data);

    let mut valid = Vec::with_capacity(resolution * resolution);
    for &hb in &hb_axis {
        for &ha in &ha_axis {
            valid.push(
                ha >= hb
                    && hull.contains(ha, hb)
                    && has_sample_within(data, ha, hb, search_radius),
            );
        }
    }

    let grid = Grid {
        ha_axis,
        hb_axis,
        valid,
        extent,
        hull,
        field_step,
        smoothing_factor,
        search_radius,
    };
    log::debug!(
        "grid {}x{}: {} valid point(s), hull of {} vertices, field step {}, search radius {}",
        resolution,
        resolution,
        grid.n_valid(),
        grid.hull.vertices().len(),
        field_step,
        search_radius
    );
    Ok(grid)
}

/// `n` evenly spaced values from `lo` to `hi`, both endpoints included exactly.
pub(crate) fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    debug_assert!(n >= 2);
    let step = (hi - lo) / (n - 1) as f64;
    let mut out: Vec<f64> = (0..n).map(|k| lo + step * k as f64).collect();
    out[n - 1] = hi;
    out
}

/// Nearest index of `x` on an evenly spaced axis, `None` beyond half a step outside it.
pub(crate) fn nearest_on_axis(axis: &[f64], x: f64) -> Option<usize> {
    let n = axis.len();
    let lo = axis[0];
    let hi = axis[n - 1];
    let span = hi - lo;
    let slack = 1e-9 * lo.abs().max(hi.abs()).max(1.0);
    if span <= 0.0 {
        return ((x - lo).abs() <= slack).then_some(0);
    }
    let step = span / (n - 1) as f64;
    let pos = (x - lo) / step;
    let half = 0.5 + slack / step;
    if pos < -half || pos > (n - 1) as f64 + half {
        return None;
    }
    Some((pos.round().max(0.0) as usize).min(n - 1))
}

/// `true` if some sample lies within Euclidean distance `radius` of `(ha, hb)`.
fn has_sample_within(data: &MeasurementSet, ha: f64, hb: f64, radius: f64) -> bool {
    let (lo, hi) = data.curve_range(hb - radius, hb + radius);
    data.curves()[lo..hi].iter().any(|c| {
        let dy = c.hb() - hb;
        let reach = (radius * radius - dy * dy).max(0.0).sqrt();
        let (a, b) = c.index_range(ha - reach, ha + reach);
        a < b
    })
}

impl Grid {
    /// Points per axis.
    #[inline]
    pub fn resolution(&self) -> usize {
        self.ha_axis.len()
    }

    /// Total number of lattice points.
    #[inline]
    pub fn len(&self) -> usize {
        self.valid.len()
    }

    /// Always `false`; a grid has at least 2 x 2 points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    /// Applied-field coordinates, ascending.
    pub fn ha_axis(&self) -> &[f64] {
        &self.ha_axis
    }

    /// Reversal-field coordinates, ascending.
    pub fn hb_axis(&self) -> &[f64] {
        &self.hb_axis
    }

    /// Bounding box of the samples the grid was laid over.
    pub fn extent(&self) -> FieldExtent {
        self.extent
    }

    /// Field step the search radius is measured in.
    pub fn field_step(&self) -> f64 {
        self.field_step
    }

    /// Smoothing factor the grid was built for.
    pub fn smoothing_factor(&self) -> usize {
        self.smoothing_factor
    }

    /// Radius used for the validity check, `smoothing_factor * field_step`.
    pub fn search_radius(&self) -> f64 {
        self.search_radius
    }

    /// Convex hull of the measured region.
    pub fn hull(&self) -> &DataHull {
        &self.hull
    }

    /// `true` if `(ha, hb)` lies inside the measured region.
    pub fn in_hull(&self, ha: f64, hb: f64) -> bool {
        self.hull.contains(ha, hb)
    }

    /// Number of valid points.
    pub fn n_valid(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Flat index of `(i, j)`.
    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.resolution() && j < self.resolution());
        j * self.resolution() + i
    }

    /// Point at flat index `k`.
    pub fn point(&self, k: usize) -> GridPoint {
        let n = self.resolution();
        let (i, j) = (k % n, k / n);
        GridPoint { i, j, ha: self.ha_axis[i], hb: self.hb_axis[j], valid: self.valid[k] }
    }

    /// Every point in flat-index order.
    pub fn points(&self) -> impl Iterator<Item = GridPoint> + '_ {
        (0..self.len()).map(|k| self.point(k))
    }

    /// Flat index of the lattice point nearest to `(ha, hb)`, if it lies on the lattice.
    pub fn locate(&self, ha: f64, hb: f64) -> Option<usize> {
        let i = nearest_on_axis(&self.ha_axis, ha)?;
        let j = nearest_on_axis(&self.hb_axis, hb)?;
        Some(self.index(i, j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use forc_core::ReversalCurve;

    /// Curves at hb = -10, -5, .., 10 with ha from hb to 10 in unit steps.
    fn triangle() -> MeasurementSet {
        let curves = [-10.0, -5.0, 0.0, 5.0, 10.0]
            .into_iter()
            .map(|hb: f64| {
                let n = (10.0 - hb) as usize + 1;
                let ha: Vec<f64> = (0..n).map(|j| hb + j as f64).collect();
                let m = ha.iter().map(|h| h - hb).collect();
                ReversalCurve::new(hb, ha, m).unwrap()
            })
            .collect();
        MeasurementSet::new(curves).unwrap()
    }

    #[test]
    fn test_linspace_endpoints() {
        let v = linspace(-1.0, 1.0, 5);
        assert_eq!(v, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert_eq!(linspace(2.0, 2.0, 3), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_nearest_on_axis() {
        let axis = linspace(0.0, 4.0, 5);
        assert_eq!(nearest_on_axis(&axis, 1.4), Some(1));
        assert_eq!(nearest_on_axis(&axis, 1.6), Some(2));
        assert_eq!(nearest_on_axis(&axis, -0.5), Some(0));
        assert_eq!(nearest_on_axis(&axis, -0.6), None);
        assert_eq!(nearest_on_axis(&axis, 4.5), Some(4));
        assert_eq!(nearest_on_axis(&axis, 4.6), None);
        assert_eq!(nearest_on_axis(&[3.0, 3.0], 3.0), Some(0));
        assert_eq!(nearest_on_axis(&[3.0, 3.0], 3.5), None);
    }

    #[test]
    fn test_grid_covers_bounding_box() {
        let grid = build_grid(&triangle(), 21, 2).unwrap();
        assert_eq!(grid.resolution(), 21);
        assert_eq!(grid.len(), 441);
        assert_eq!(grid.ha_axis()[0], -10.0);
        assert_eq!(grid.ha_axis()[20], 10.0);
        assert_eq!(grid.hb_axis()[0], -10.0);
        assert_eq!(grid.hb_axis()[20], 10.0);
        assert_abs_diff_eq!(grid.field_step(), 1.0);
        assert_abs_diff_eq!(grid.search_radius(), 2.0);
    }

    #[test]
    fn test_non_physical_half_plane_is_invalid() {
        let grid = build_grid(&triangle(), 21, 2).unwrap();
        for p in grid.points() {
            if p.ha < p.hb {
                assert!(!p.valid, "point {p:?} below the diagonal must be invalid");
            }
        }
        // On a measured curve.
        let k = grid.locate(5.0, 0.0).unwrap();
        assert!(grid.point(k).valid);
    }

    #[test]
    fn test_points_far_from_curves_are_invalid() {
        // hb = -7.5 lies 2.5 from the nearest curve; radius 2 cannot reach it.
        let grid = build_grid(&triangle(), 9, 2).unwrap();
        let k = grid.locate(5.0, -7.5).unwrap();
        assert!(!grid.point(k).valid);
        // Radius 3 can.
        let grid = build_grid(&triangle(), 9, 3).unwrap();
        let k = grid.locate(5.0, -7.5).unwrap();
        assert!(grid.point(k).valid);
    }

    #[test]
    fn test_bad_parameters() {
        assert!(matches!(build_grid(&triangle(), 1, 2), Err(Error::Configuration(_))));
        assert!(matches!(build_grid(&triangle(), 10, 0), Err(Error::Configuration(_))));
        for step in [0.0, -1.0, f64::NAN] {
            let r = build_grid_with_step(&triangle(), 10, 2, Some(step));
            assert!(matches!(r, Err(Error::Configuration(_))), "step {step}");
        }
    }

    #[test]
    fn test_explicit_field_step_sets_search_radius() {
        let grid = build_grid_with_step(&triangle(), 9, 2, Some(2.0)).unwrap();
        assert_abs_diff_eq!(grid.field_step(), 2.0);
        assert_abs_diff_eq!(grid.search_radius(), 4.0);
        assert_eq!(grid.smoothing_factor(), 2);
        // hb = -7.5 is 2.5 from the nearest curve: out of reach at radius 2, within 4.
        let k = grid.locate(5.0, -7.5).unwrap();
        assert!(grid.point(k).valid);
    }

    #[test]
    fn test_points_outside_hull_are_invalid() {
        // hb = 0..=10; curves with hb <= 5 run to ha = 20, the rest stop at ha = 12.
        let curves = (0..=10)
            .map(|k| {
                let hb = k as f64;
                let end = if k <= 5 { 20 } else { 12 };
                let ha: Vec<f64> = (k..=end).map(|h| h as f64).collect();
                let m = vec![0.0; ha.len()];
                ReversalCurve::new(hb, ha, m).unwrap()
            })
            .collect();
        let data = MeasurementSet::new(curves).unwrap();
        let grid = build_grid(&data, 21, 4).unwrap();
        let mut outside = 0;
        for p in grid.points() {
            // Hull edge from (20, 5) to (12, 10).
            if p.hb > 5.0 + (20.0 - p.ha) * 0.625 + 1e-9 {
                assert!(!p.valid, "point {p:?} beyond the measured region must be invalid");
                assert!(!grid.in_hull(p.ha, p.hb));
                outside += 1;
            }
        }
        assert!(outside > 0);
        // Corner of the measured region and a point on the hull edge.
        assert!(grid.point(grid.locate(20.0, 5.0).unwrap()).valid);
        assert!(grid.in_hull(16.0, 7.5));
    }

    #[test]
    fn test_point_index_roundtrip() {
        let grid = build_grid(&triangle(), 7, 1).unwrap();
        for k in 0..grid.len() {
            let p = grid.point(k);
            assert_eq!(grid.index(p.i, p.j), k);
            assert_eq!(grid.locate(p.ha, p.hb), Some(k));
        }
    }
}
