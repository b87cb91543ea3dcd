//! FORC diagram assembly in coercivity / interaction-field coordinates.
//!
//! `hc = (ha − hb) / 2`, `hu = (ha + hb) / 2`. The output lattice has the
//! same side length as the field grid and spans the reprojection of the
//! physical (`ha >= hb`) part of the grid's bounding box. Each cell takes the
//! density of the nearest field-grid point; cells whose nearest point is
//! missing or off the grid stay missing. Nothing is interpolated across
//! missing cells.

use forc_core::{Error, ForcResult, Result};
use serde::Serialize;

use crate::differentiate::DensityMap;
use crate::grid::linspace;

/// Dense FORC diagram: rows follow `hu`, columns follow `hc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForcDistribution {
    hc_axis: Vec<f64>,
    hu_axis: Vec<f64>,
    cells: Vec<Option<f64>>,
    normalized: bool,
}

impl ForcDistribution {
    /// Coercivity axis, ascending.
    pub fn hc_axis(&self) -> &[f64] {
        &self.hc_axis
    }

    /// Interaction-field axis, ascending.
    pub fn hu_axis(&self) -> &[f64] {
        &self.hu_axis
    }

    /// `(rows, cols)` = `(hu_axis.len(), hc_axis.len())`.
    pub fn shape(&self) -> (usize, usize) {
        (self.hu_axis.len(), self.hc_axis.len())
    }

    /// Row-major cells; `None` marks a missing value.
    pub fn cells(&self) -> &[Option<f64>] {
        &self.cells
    }

    /// Whether densities were scaled to a maximum of 1.
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Density at column `i` (hc) and row `j` (hu).
    #[inline]
    pub fn value(&self, i: usize, j: usize) -> Option<f64> {
        self.cells[j * self.hc_axis.len() + i]
    }

    /// Cell at column `i` (hc) and row `j` (hu) with its coordinates.
    pub fn get(&self, i: usize, j: usize) -> ForcResult {
        ForcResult { hc: self.hc_axis[i], hu: self.hu_axis[j], rho: self.value(i, j) }
    }

    /// Every cell in row-major order.
    pub fn results(&self) -> impl Iterator<Item = ForcResult> + '_ {
        let n = self.hc_axis.len();
        (0..self.cells.len()).map(move |k| self.get(k % n, k / n))
    }

    /// Cells with a density.
    pub fn n_present(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Cells without a density.
    pub fn n_missing(&self) -> usize {
        self.cells.len() - self.n_present()
    }

    /// Largest density, if any cell has one.
    pub fn max_density(&self) -> Option<f64> {
        self.cells.iter().flatten().copied().reduce(f64::max)
    }

    /// Row-major `f64` buffer with `missing` in place of absent values (typically `f64::NAN`).
    pub fn to_dense(&self, missing: f64) -> Vec<f64> {
        self.cells.iter().map(|c| c.unwrap_or(missing)).collect()
    }
}

/// Reproject a density map onto (hc, hu) axes.
pub fn assemble(map: &DensityMap, normalize: bool) -> Result<ForcDistribution> {
    if map.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let grid = map.grid();
    let n = grid.resolution();
    let extent = grid.extent();
    let (hc_lo, hc_hi) = extent.hc_range();
    let (hu_lo, hu_hi) = extent.hu_range();
    let hc_axis = linspace(hc_lo, hc_hi, n);
    let hu_axis = linspace(hu_lo, hu_hi, n);

    let mut cells = Vec::with_capacity(n * n);
    for &hu in &hu_axis {
        for &hc in &hc_axis {
            let (ha, hb) = (hu + hc, hu - hc);
            let cell = if grid.in_hull(ha, hb) {
                grid.locate(ha, hb).and_then(|k| map.rho(k))
            } else {
                None
            };
            cells.push(cell);
        }
    }

    let mut dist = ForcDistribution { hc_axis, hu_axis, cells, normalized: false };
    if normalize {
        normalize_max(&mut dist);
    }
    log::debug!(
        "assembled {}x{} diagram: {} present, {} missing",
        n,
        n,
        dist.n_present(),
        dist.n_missing()
    );
    Ok(dist)
}

/// Divide every present value by the maximum density; masking is untouched.
fn normalize_max(dist: &mut ForcDistribution) {
    match dist.max_density() {
        Some(max) if max > 0.0 => {
            for v in dist.cells.iter_mut().flatten() {
                *v /= max;
            }
            dist.normalized = true;
        }
        other => {
            log::warn!("normalization skipped: maximum density is {other:?}, not positive");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differentiate::{FitSettings, differentiate};
    use crate::grid::build_grid;
    use crate::pool::{CancelToken, ComputePool};
    use approx::assert_abs_diff_eq;
    use forc_core::{MeasurementSet, NeighborhoodPolicy, ReversalCurve};

    /// Curves at hb = -10..=9 with ha from hb to 10, `m = f(ha, hb)`.
    fn dense(f: impl Fn(f64, f64) -> f64) -> MeasurementSet {
        let curves = (-10..=9)
            .map(|k| {
                let hb = k as f64;
                let ha: Vec<f64> = (k..=10).map(|h| h as f64).collect();
                let m = ha.iter().map(|&h| f(h, hb)).collect();
                ReversalCurve::new(hb, ha, m).unwrap()
            })
            .collect();
        MeasurementSet::new(curves).unwrap()
    }

    fn density_map(data: &MeasurementSet, resolution: usize, sf: usize) -> DensityMap {
        let grid = build_grid(data, resolution, sf).unwrap();
        let settings = FitSettings {
            smoothing_factor: sf,
            neighborhood: NeighborhoodPolicy::SampleIndex,
            density_scale: 1.0,
        };
        let pool = ComputePool::sequential().unwrap();
        differentiate(data, &grid, &settings, &pool, &CancelToken::new()).unwrap()
    }

    #[test]
    fn test_axes_span_reprojected_box() {
        let data = dense(|ha, hb| ha * hb);
        let map = density_map(&data, 21, 2);
        let dist = assemble(&map, false).unwrap();
        assert_eq!(dist.shape(), (21, 21));
        // ha in [-10, 10], hb in [-10, 9]
        assert_abs_diff_eq!(dist.hc_axis()[0], 0.0);
        assert_abs_diff_eq!(dist.hc_axis()[20], 10.0);
        assert_abs_diff_eq!(dist.hu_axis()[0], -10.0);
        assert_abs_diff_eq!(dist.hu_axis()[20], 9.5);
        assert!(dist.hc_axis().windows(2).all(|w| w[0] < w[1]));
        assert!(dist.hu_axis().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_cells_outside_measured_region_are_missing() {
        let data = dense(|ha, hb| ha * hb);
        let map = density_map(&data, 21, 2);
        let dist = assemble(&map, false).unwrap();
        // hc = 10, hu = 9.5 maps to ha = 19.5: off the grid.
        assert_eq!(dist.value(20, 20), None);
        for r in dist.results() {
            if let Some(rho) = r.rho {
                assert!(rho.is_finite());
                assert_abs_diff_eq!(rho, -0.5, epsilon = 1e-9);
            }
        }
        assert!(dist.n_present() > 0);
        assert!(dist.n_missing() > 0);
    }

    #[test]
    fn test_cells_beyond_the_data_hull_are_missing() {
        // hb = 0..=10; curves with hb <= 5 run to ha = 20, the rest stop at ha = 12.
        let curves = (0..=10)
            .map(|k| {
                let hb = k as f64;
                let end = if k <= 5 { 20 } else { 12 };
                let ha: Vec<f64> = (k..=end).map(|h| h as f64).collect();
                let m = ha.iter().map(|&h| 0.3 * h - 0.01 * h * h + 0.02 * h * hb).collect();
                ReversalCurve::new(hb, ha, m).unwrap()
            })
            .collect();
        let data = MeasurementSet::new(curves).unwrap();
        let map = density_map(&data, 21, 4);
        let dist = assemble(&map, false).unwrap();

        let mut beyond = 0;
        for r in dist.results() {
            let (ha, hb) = (r.hu + r.hc, r.hu - r.hc);
            // Hull edge from (20, 5) to (12, 10).
            if hb > 5.0 + (20.0 - ha) * 0.625 + 1e-9 {
                assert_eq!(r.rho, None, "cell at ha={ha} hb={hb} lies beyond the data");
                beyond += 1;
            }
        }
        assert!(beyond > 0);
        for k in 0..map.grid().len() {
            let p = map.grid().point(k);
            if p.hb > 5.0 + (20.0 - p.ha) * 0.625 + 1e-9 {
                assert_eq!(map.rho(k), None, "grid point {p:?} lies beyond the data");
            }
        }
        assert!(dist.n_present() > 0);
        for v in dist.cells().iter().flatten() {
            assert_abs_diff_eq!(*v, -0.01, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_normalization_scales_to_one_and_keeps_mask() {
        let data = dense(|ha, hb| -ha * hb * (1.0 + 0.01 * ha));
        let map = density_map(&data, 15, 2);
        let raw = assemble(&map, false).unwrap();
        let norm = assemble(&map, true).unwrap();
        assert!(norm.is_normalized());
        assert_abs_diff_eq!(norm.max_density().unwrap(), 1.0, epsilon = 1e-12);
        let max = raw.max_density().unwrap();
        for (a, b) in raw.cells().iter().zip(norm.cells()) {
            assert_eq!(a.is_some(), b.is_some());
            if let (Some(a), Some(b)) = (a, b) {
                assert_abs_diff_eq!(a / max, *b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_normalization_skipped_without_positive_maximum() {
        // rho = -0.5 everywhere: no positive maximum.
        let data = dense(|ha, hb| ha * hb);
        let map = density_map(&data, 9, 2);
        let dist = assemble(&map, true).unwrap();
        assert!(!dist.is_normalized());
        assert_eq!(dist, assemble(&map, false).unwrap());
    }

    #[test]
    fn test_to_dense_uses_missing_marker() {
        let data = dense(|ha, hb| ha * hb);
        let dist = assemble(&density_map(&data, 9, 2), false).unwrap();
        let dense = dist.to_dense(f64::NAN);
        assert_eq!(dense.len(), 81);
        for (v, c) in dense.iter().zip(dist.cells()) {
            assert_eq!(v.is_nan(), c.is_none());
        }
    }

    #[test]
    fn test_cancelled_map_is_rejected() {
        let data = dense(|ha, hb| ha * hb);
        let grid = build_grid(&data, 6, 2).unwrap();
        let settings = FitSettings {
            smoothing_factor: 2,
            neighborhood: NeighborhoodPolicy::SampleIndex,
            density_scale: 1.0,
        };
        let cancel = CancelToken::new();
        cancel.cancel();
        let pool = ComputePool::sequential().unwrap();
        let map = differentiate(&data, &grid, &settings, &pool, &cancel).unwrap();
        assert_eq!(assemble(&map, false), Err(Error::Cancelled));
    }
}
