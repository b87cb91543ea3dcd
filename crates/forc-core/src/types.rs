//! Configuration and result types for FORC analysis

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How the differentiator chooses the samples for each local fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborhoodPolicy {
    /// Curves within `smoothing_factor` curve indices of the nearest curve, and in each of
    /// them the samples within `smoothing_factor` indices of the reading nearest to `ha`.
    SampleIndex,
    /// Every sample within `smoothing_factor` field steps (Euclidean in (ha, hb)).
    FieldDistance,
}

/// Parameters of one pipeline run.
///
/// There is no `Default`: every option is chosen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcConfig {
    /// Number of lattice points along each axis of the field grid and of the output diagram.
    pub resolution: usize,
    /// Neighborhood half-width, in samples, of the local polynomial fit.
    pub smoothing_factor: usize,
    /// Leading points dropped from every curve (post-reversal transient).
    pub trim_points: usize,
    /// Scale the output so that its maximum density equals 1.
    pub normalize: bool,
    /// Two reversal fields closer than this belong to the same curve.
    pub hb_tolerance: f64,
    /// Unit factor applied to every density value.
    pub density_scale: f64,
    /// Neighborhood definition used by the local fits.
    pub neighborhood: NeighborhoodPolicy,
    /// Field step for the search radius; `None` uses the median applied-field step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_step: Option<f64>,
}

impl ForcConfig {
    /// Check every parameter; called before any computation starts.
    pub fn validate(&self) -> Result<()> {
        if self.resolution < 2 {
            return Err(Error::Configuration(format!(
                "resolution must be >= 2, got {}",
                self.resolution
            )));
        }
        if self.smoothing_factor < 1 {
            return Err(Error::Configuration("smoothing_factor must be >= 1, got 0".to_string()));
        }
        if !self.density_scale.is_finite() || self.density_scale == 0.0 {
            return Err(Error::Configuration(format!(
                "density_scale must be finite and non-zero, got {}",
                self.density_scale
            )));
        }
        if let Some(step) = self.field_step
            && (!step.is_finite() || step <= 0.0)
        {
            return Err(Error::Configuration(format!(
                "field_step must be finite and > 0, got {step}"
            )));
        }
        self.extract_config().validate()
    }

    /// The part of the configuration used by curve extraction.
    pub fn extract_config(&self) -> ExtractConfig {
        ExtractConfig { hb_tolerance: self.hb_tolerance, trim_points: self.trim_points }
    }
}

/// Parameters of curve extraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Two reversal fields closer than this belong to the same curve.
    pub hb_tolerance: f64,
    /// Leading points dropped from every curve.
    pub trim_points: usize,
}

impl ExtractConfig {
    /// Reject negative or non-finite tolerances.
    pub fn validate(&self) -> Result<()> {
        if !self.hb_tolerance.is_finite() || self.hb_tolerance < 0.0 {
            return Err(Error::Configuration(format!(
                "hb_tolerance must be finite and >= 0, got {}",
                self.hb_tolerance
            )));
        }
        Ok(())
    }
}

/// Drift correction from the saturation readings at the end of each curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftCorrection {
    /// Moving-average half-width; the window is `2 * kernel_size + 1` curves.
    pub kernel_size: usize,
    /// Keep every `density`-th averaged drift point as an interpolation node.
    pub density: usize,
}

/// Removal of a para-/diamagnetic background linear in the applied field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlopeCorrection {
    /// Saturation field; samples with `|ha| > h_sat` are used for the fit.
    pub h_sat: f64,
}

/// Optional preprocessing applied to a measurement set before a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Drift correction, applied first.
    pub drift: Option<DriftCorrection>,
    /// Background slope correction, applied second.
    pub slope: Option<SlopeCorrection>,
    /// Rescale magnetization to [-1, 1], applied last.
    pub rescale: bool,
}

impl PreprocessConfig {
    /// Reject parameters that cannot produce a meaningful correction.
    pub fn validate(&self) -> Result<()> {
        if let Some(d) = &self.drift
            && d.density == 0
        {
            return Err(Error::Configuration("drift density must be >= 1".to_string()));
        }
        if let Some(s) = &self.slope
            && (!s.h_sat.is_finite() || s.h_sat < 0.0)
        {
            return Err(Error::Configuration(format!(
                "h_sat must be finite and >= 0, got {}",
                s.h_sat
            )));
        }
        Ok(())
    }

    /// `true` if no step is enabled.
    pub fn is_noop(&self) -> bool {
        self.drift.is_none() && self.slope.is_none() && !self.rescale
    }
}

/// Axis-aligned bounding box in (ha, hb).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldExtent {
    /// Smallest applied field.
    pub ha_min: f64,
    /// Largest applied field.
    pub ha_max: f64,
    /// Smallest reversal field.
    pub hb_min: f64,
    /// Largest reversal field.
    pub hb_max: f64,
}

impl FieldExtent {
    /// Coercivity range covered by the part of the box with `ha >= hb`.
    pub fn hc_range(&self) -> (f64, f64) {
        let lo = (0.5 * (self.ha_min - self.hb_max)).max(0.0);
        let hi = 0.5 * (self.ha_max - self.hb_min);
        (lo, hi.max(lo))
    }

    /// Interaction-field range covered by the part of the box with `ha >= hb`.
    pub fn hu_range(&self) -> (f64, f64) {
        (0.5 * (self.ha_min + self.hb_min), 0.5 * (self.ha_max + self.hb_max))
    }
}

/// One cell of a FORC diagram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForcResult {
    /// Coercivity field `(ha - hb) / 2`.
    pub hc: f64,
    /// Interaction field `(ha + hb) / 2`.
    pub hu: f64,
    /// FORC density, `None` where it could not be estimated.
    pub rho: Option<f64>,
}
