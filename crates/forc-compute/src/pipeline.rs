//! End-to-end runs: measurement set + configuration → FORC diagram.
//!
//! A run is a pure function of its inputs. Changing the smoothing factor
//! means calling [`run`] again on the same [`MeasurementSet`]; nothing is
//! cached here.

use forc_core::{
    Error, ExtractionWarning, ForcConfig, MeasurementSet, NeighborhoodPolicy, Result, Sample,
};
use serde::Serialize;

use crate::assemble::{ForcDistribution, assemble};
use crate::differentiate::{FitSettings, OutcomeCounts, differentiate};
use crate::extract::extract;
use crate::grid::build_grid_with_step;
use crate::pool::{CancelToken, ComputePool};

/// Facts about a run, for the caller to surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDiagnostics {
    /// Curves in the measurement set.
    pub n_curves: usize,
    /// Samples in the measurement set.
    pub n_samples: usize,
    /// Field step in use: the configured override or the median applied-field step.
    pub field_step: f64,
    /// Grid validity / fit reach radius.
    pub search_radius: f64,
    /// Neighborhood policy used.
    pub neighborhood: NeighborhoodPolicy,
    /// Grid points with samples in reach.
    pub grid_valid: usize,
    /// Per-outcome counts of the differentiation.
    pub outcomes: OutcomeCounts,
    /// Warnings recorded while the measurement set was built.
    pub warnings: Vec<ExtractionWarning>,
}

/// Output of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForcRun {
    /// FORC diagram.
    pub distribution: ForcDistribution,
    /// Run diagnostics.
    pub diagnostics: RunDiagnostics,
}

/// Compute the FORC diagram of an already extracted measurement set.
///
/// `config.trim_points` and `config.hb_tolerance` were applied when `data` was
/// built and are not used again here.
pub fn run(
    data: &MeasurementSet,
    config: &ForcConfig,
    pool: &ComputePool,
    cancel: &CancelToken,
) -> Result<ForcRun> {
    config.validate()?;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let grid = build_grid_with_step(
        data,
        config.resolution,
        config.smoothing_factor,
        config.field_step,
    )?;
    let settings = FitSettings::from_config(config);
    let map = differentiate(data, &grid, &settings, pool, cancel)?;
    let distribution = assemble(&map, config.normalize)?;

    let diagnostics = RunDiagnostics {
        n_curves: data.n_curves(),
        n_samples: data.n_samples(),
        field_step: grid.field_step(),
        search_radius: grid.search_radius(),
        neighborhood: config.neighborhood,
        grid_valid: grid.n_valid(),
        outcomes: map.counts(),
        warnings: data.warnings().to_vec(),
    };
    Ok(ForcRun { distribution, diagnostics })
}

/// Extract curves from raw samples, then [`run`].
pub fn run_samples(
    raw: &[Sample],
    config: &ForcConfig,
    pool: &ComputePool,
    cancel: &CancelToken,
) -> Result<ForcRun> {
    config.validate()?;
    let data = extract(raw, &config.extract_config())?;
    run(&data, config, pool, cancel)
}
