//! Local-regression differentiator.
//!
//! For each valid grid point, a quadratic surface is fitted to the samples the
//! neighborhood selector picks, and the FORC density is
//!
//! `rho = -½ ∂²m/∂ha∂hb = -f / 2`
//!
//! scaled by the configured unit factor. Points are independent: the map runs
//! on the caller's [`ComputePool`], each worker writing its own output slot.
//! The cancel token is checked before every point; points not reached are
//! reported as [`PointOutcome::NotEvaluated`].

use forc_core::{Error, ForcConfig, MeasurementSet, NeighborhoodPolicy, Result, Sample};
use rayon::prelude::*;
use serde::Serialize;

use crate::grid::Grid;
use crate::local_fit::{FitFailure, fit_quadratic};
use crate::neighborhood::selector_for;
use crate::pool::{CancelToken, ComputePool};

/// Parameters of the local fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSettings {
    /// Neighborhood half-width in samples; must match the grid's smoothing factor.
    pub smoothing_factor: usize,
    /// Neighborhood definition.
    pub neighborhood: NeighborhoodPolicy,
    /// Unit factor applied to every density.
    pub density_scale: f64,
}

impl FitSettings {
    /// Fit settings of a run configuration.
    pub fn from_config(config: &ForcConfig) -> Self {
        Self {
            smoothing_factor: config.smoothing_factor,
            neighborhood: config.neighborhood,
            density_scale: config.density_scale,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.smoothing_factor < 1 {
            return Err(Error::Configuration("smoothing_factor must be >= 1, got 0".to_string()));
        }
        if !self.density_scale.is_finite() || self.density_scale == 0.0 {
            return Err(Error::Configuration(format!(
                "density_scale must be finite and non-zero, got {}",
                self.density_scale
            )));
        }
        Ok(())
    }
}

/// Result of one grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum PointOutcome {
    /// Estimated density.
    Density(f64),
    /// No estimate; see [`FitFailure`].
    Invalid(FitFailure),
    /// Skipped because the run was cancelled.
    NotEvaluated,
}

/// Per-outcome point counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    /// Points with a density estimate.
    pub density: usize,
    /// Points outside the measured region.
    pub outside_data: usize,
    /// Points with fewer samples than coefficients.
    pub underdetermined: usize,
    /// Points whose fit was rank deficient.
    pub singular: usize,
    /// Points skipped by cancellation.
    pub not_evaluated: usize,
}

impl OutcomeCounts {
    /// Points without a density estimate.
    pub fn missing(&self) -> usize {
        self.outside_data + self.underdetermined + self.singular + self.not_evaluated
    }
}

/// Density estimate (or failure) for every grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityMap {
    grid: Grid,
    outcomes: Vec<PointOutcome>,
}

impl DensityMap {
    /// Grid the map was computed on.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Outcomes in the grid's flat-index order.
    pub fn outcomes(&self) -> &[PointOutcome] {
        &self.outcomes
    }

    /// Density at flat index `k`, if estimated.
    #[inline]
    pub fn rho(&self, k: usize) -> Option<f64> {
        match self.outcomes[k] {
            PointOutcome::Density(rho) => Some(rho),
            _ => None,
        }
    }

    /// `true` if cancellation left any point unevaluated.
    pub fn is_cancelled(&self) -> bool {
        self.outcomes.iter().any(|o| matches!(o, PointOutcome::NotEvaluated))
    }

    /// Count points per outcome.
    pub fn counts(&self) -> OutcomeCounts {
        let mut c = OutcomeCounts::default();
        for o in &self.outcomes {
            match o {
                PointOutcome::Density(_) => c.density += 1,
                PointOutcome::Invalid(FitFailure::OutsideData) => c.outside_data += 1,
                PointOutcome::Invalid(FitFailure::Underdetermined) => c.underdetermined += 1,
                PointOutcome::Invalid(FitFailure::Singular) => c.singular += 1,
                PointOutcome::NotEvaluated => c.not_evaluated += 1,
            }
        }
        c
    }
}

/// Estimate the FORC density at every grid point.
pub fn differentiate(
    data: &MeasurementSet,
    grid: &Grid,
    settings: &FitSettings,
    pool: &ComputePool,
    cancel: &CancelToken,
) -> Result<DensityMap> {
    settings.validate()?;
    if grid.smoothing_factor() != settings.smoothing_factor {
        return Err(Error::Configuration(format!(
            "grid was built for smoothing_factor {}, fit uses {}",
            grid.smoothing_factor(),
            settings.smoothing_factor
        )));
    }
    let reach = grid.search_radius();
    let selector = selector_for(settings.neighborhood, settings.smoothing_factor, reach);
    let scale = settings.density_scale;

    let outcomes: Vec<PointOutcome> = pool.install(|| {
        (0..grid.len())
            .into_par_iter()
            .with_min_len(16)
            .map_init(Vec::<Sample>::new, |buf, k| {
                if cancel.is_cancelled() {
                    return PointOutcome::NotEvaluated;
                }
                let p = grid.point(k);
                if !p.valid {
                    return PointOutcome::Invalid(FitFailure::OutsideData);
                }
                buf.clear();
                selector.select(data, p.ha, p.hb, buf);
                match fit_quadratic(buf, p.ha, p.hb) {
                    Ok(fit) => PointOutcome::Density(-0.5 * fit.mixed() * scale),
                    Err(failure) => PointOutcome::Invalid(failure),
                }
            })
            .collect()
    });

    let map = DensityMap { grid: grid.clone(), outcomes };
    let counts = map.counts();
    if counts.not_evaluated > 0 {
        log::warn!(
            "differentiation cancelled: {} of {} point(s) not evaluated",
            counts.not_evaluated,
            grid.len()
        );
    }
    log::debug!(
        "differentiated {} point(s) with {} neighborhood (sf={}): {:?}",
        grid.len(),
        selector.name(),
        settings.smoothing_factor,
        counts
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::build_grid;
    use approx::assert_abs_diff_eq;
    use forc_core::ReversalCurve;

    /// Curves at hb = -10..=9 with ha from hb to 10 in unit steps, `m = f(ha, hb)`.
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

    fn settings(sf: usize) -> FitSettings {
        FitSettings {
            smoothing_factor: sf,
            neighborhood: NeighborhoodPolicy::SampleIndex,
            density_scale: 1.0,
        }
    }

    #[test]
    fn test_mixed_term_gives_density() {
        let data = dense(|ha, hb| 0.3 * ha * hb + ha);
        let grid = build_grid(&data, 11, 2).unwrap();
        let pool = ComputePool::new(2).unwrap();
        let map = differentiate(&data, &grid, &settings(2), &pool, &CancelToken::new()).unwrap();
        assert!(map.counts().density > 0);
        for k in 0..grid.len() {
            if let Some(rho) = map.rho(k) {
                assert_abs_diff_eq!(rho, -0.15, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_density_scale_applied() {
        let data = dense(|ha, hb| ha * hb);
        let grid = build_grid(&data, 6, 2).unwrap();
        let pool = ComputePool::sequential().unwrap();
        let s = FitSettings { density_scale: 4.0, ..settings(2) };
        let map = differentiate(&data, &grid, &s, &pool, &CancelToken::new()).unwrap();
        let rho: Vec<f64> = (0..grid.len()).filter_map(|k| map.rho(k)).collect();
        assert!(!rho.is_empty());
        for r in rho {
            assert_abs_diff_eq!(r, -2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_invalid_grid_points_stay_invalid() {
        let data = dense(|ha, hb| ha * hb);
        let grid = build_grid(&data, 9, 1).unwrap();
        let pool = ComputePool::sequential().unwrap();
        let map = differentiate(&data, &grid, &settings(1), &pool, &CancelToken::new()).unwrap();
        for (k, p) in grid.points().enumerate() {
            if !p.valid {
                assert_eq!(map.outcomes()[k], PointOutcome::Invalid(FitFailure::OutsideData));
            }
        }
        assert_eq!(map.counts().outside_data, grid.len() - grid.n_valid());
    }

    #[test]
    fn test_cancelled_before_start_evaluates_nothing() {
        let data = dense(|ha, hb| ha * hb);
        let grid = build_grid(&data, 8, 2).unwrap();
        let pool = ComputePool::sequential().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let map = differentiate(&data, &grid, &settings(2), &pool, &cancel).unwrap();
        assert!(map.is_cancelled());
        assert_eq!(map.counts().not_evaluated, grid.len());
    }

    #[test]
    fn test_thread_count_does_not_change_result() {
        let data = dense(|ha, hb| (0.1 * ha).tanh() * (0.2 * hb).cos());
        let grid = build_grid(&data, 15, 2).unwrap();
        let one = ComputePool::new(1).unwrap();
        let four = ComputePool::new(4).unwrap();
        let a = differentiate(&data, &grid, &settings(2), &one, &CancelToken::new()).unwrap();
        let b = differentiate(&data, &grid, &settings(2), &four, &CancelToken::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_bad_settings() {
        let data = dense(|ha, hb| ha * hb);
        let grid = build_grid(&data, 4, 1).unwrap();
        let pool = ComputePool::sequential().unwrap();
        let s = FitSettings { density_scale: f64::NAN, ..settings(1) };
        let err = differentiate(&data, &grid, &s, &pool, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_rejects_grid_built_for_other_smoothing_factor() {
        let data = dense(|ha, hb| ha * hb);
        let grid = build_grid(&data, 6, 1).unwrap();
        let pool = ComputePool::sequential().unwrap();
        let err = differentiate(&data, &grid, &settings(5), &pool, &CancelToken::new());
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_reach_follows_grid_field_step() {
        let data = dense(|ha, hb| 0.3 * ha * hb + ha);
        let grid = crate::grid::build_grid_with_step(&data, 11, 2, Some(1.5)).unwrap();
        let pool = ComputePool::sequential().unwrap();
        let s = FitSettings { neighborhood: NeighborhoodPolicy::FieldDistance, ..settings(2) };
        let map = differentiate(&data, &grid, &s, &pool, &CancelToken::new()).unwrap();
        assert!(map.counts().density > 0);
        for rho in (0..grid.len()).filter_map(|k| map.rho(k)) {
            assert_abs_diff_eq!(rho, -0.15, epsilon = 1e-9);
        }
    }
}
