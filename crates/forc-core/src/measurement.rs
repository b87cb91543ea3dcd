//! Immutable measurement data model.
//!
//! A [`MeasurementSet`] owns every sample of a FORC measurement, grouped into
//! [`ReversalCurve`]s ordered by increasing reversal field. Downstream stages
//! only ever borrow it, so one set can feed any number of runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::FieldExtent;
use crate::{Error, Result};

/// One magnetometer reading: applied field `ha`, reversal field `hb`, magnetization `m`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Applied field.
    pub ha: f64,
    /// Reversal field at which the curve started.
    pub hb: f64,
    /// Measured magnetization.
    pub m: f64,
}

impl Sample {
    /// Create a new sample.
    pub fn new(ha: f64, hb: f64, m: f64) -> Self {
        Self { ha, hb, m }
    }

    /// `true` if every component is finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.ha.is_finite() && self.hb.is_finite() && self.m.is_finite()
    }
}

/// Samples recorded after a single field reversal, ordered by increasing applied field.
///
/// Invariants: non-empty, `ha` strictly increasing, `ha >= hb` everywhere, all values finite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReversalCurve {
    hb: f64,
    ha: Vec<f64>,
    m: Vec<f64>,
}

impl ReversalCurve {
    /// Create a curve from parallel `ha`/`m` columns.
    pub fn new(hb: f64, ha: Vec<f64>, m: Vec<f64>) -> Result<Self> {
        if ha.is_empty() {
            return Err(Error::MalformedInput(format!("reversal curve at hb={hb} is empty")));
        }
        if ha.len() != m.len() {
            return Err(Error::MalformedInput(format!(
                "reversal curve at hb={}: ha has {} values, m has {}",
                hb,
                ha.len(),
                m.len()
            )));
        }
        if !hb.is_finite() || ha.iter().chain(m.iter()).any(|v| !v.is_finite()) {
            return Err(Error::MalformedInput(format!(
                "reversal curve at hb={hb} contains non-finite values"
            )));
        }
        if let Some(i) = ha.windows(2).position(|w| w[1] <= w[0]) {
            return Err(Error::MalformedInput(format!(
                "reversal curve at hb={}: ha not strictly increasing at index {} ({} -> {})",
                hb,
                i + 1,
                ha[i],
                ha[i + 1]
            )));
        }
        if ha[0] < hb {
            return Err(Error::MalformedInput(format!(
                "reversal curve at hb={}: ha={} lies below the reversal field",
                hb, ha[0]
            )));
        }
        Ok(Self { hb, ha, m })
    }

    /// Reversal field shared by every sample of the curve.
    #[inline]
    pub fn hb(&self) -> f64 {
        self.hb
    }

    /// Applied-field column.
    #[inline]
    pub fn ha(&self) -> &[f64] {
        &self.ha
    }

    /// Magnetization column.
    #[inline]
    pub fn m(&self) -> &[f64] {
        &self.m
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.ha.len()
    }

    /// Always `false`; curves are non-empty by construction.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ha.is_empty()
    }

    /// Sample at within-curve index `j`.
    #[inline]
    pub fn sample(&self, j: usize) -> Sample {
        Sample { ha: self.ha[j], hb: self.hb, m: self.m[j] }
    }

    /// Iterate over the curve's samples in order of increasing `ha`.
    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.ha.iter().zip(&self.m).map(move |(&ha, &m)| Sample { ha, hb: self.hb, m })
    }

    /// Index of the sample whose `ha` is closest to `ha0` (ties resolve to the lower index).
    pub fn nearest_index(&self, ha0: f64) -> usize {
        nearest_in_sorted(&self.ha, ha0)
    }

    /// Index range `[lo, hi)` of samples with `ha` inside `[ha_lo, ha_hi]`.
    pub fn index_range(&self, ha_lo: f64, ha_hi: f64) -> (usize, usize) {
        let lo = self.ha.partition_point(|&h| h < ha_lo);
        let hi = self.ha.partition_point(|&h| h <= ha_hi);
        (lo, hi.max(lo))
    }

    /// Same fields, new magnetization column.
    pub fn with_magnetization(&self, m: Vec<f64>) -> Result<Self> {
        Self::new(self.hb, self.ha.clone(), m)
    }
}

/// Index of the value in ascending `values` closest to `x`.
pub(crate) fn nearest_in_sorted(values: &[f64], x: f64) -> usize {
    debug_assert!(!values.is_empty());
    let idx = values.partition_point(|&v| v < x);
    if idx == 0 {
        return 0;
    }
    if idx == values.len() {
        return values.len() - 1;
    }
    if (x - values[idx - 1]) <= (values[idx] - x) { idx - 1 } else { idx }
}

/// Soft failure recorded while building a [`MeasurementSet`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionWarning {
    /// Curve left with too few points after trimming; removed from the set.
    CurveDropped {
        /// Reversal field of the dropped curve.
        hb: f64,
        /// Points remaining when it was dropped.
        remaining: usize,
    },
    /// Samples with `ha < hb` removed from a curve.
    NonPhysicalPoints {
        /// Reversal field of the curve.
        hb: f64,
        /// Number of samples removed.
        count: usize,
    },
    /// Samples whose `ha` did not advance past the previous reading.
    DuplicatePoints {
        /// Reversal field of the curve.
        hb: f64,
        /// Number of samples removed.
        count: usize,
    },
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurveDropped { hb, remaining } => {
                write!(f, "curve at hb={hb} dropped: {remaining} point(s) left after trimming")
            }
            Self::NonPhysicalPoints { hb, count } => {
                write!(f, "curve at hb={hb}: removed {count} point(s) with ha < hb")
            }
            Self::DuplicatePoints { hb, count } => {
                write!(f, "curve at hb={hb}: removed {count} repeated ha reading(s)")
            }
        }
    }
}

/// Reversal curves ordered by strictly increasing reversal field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementSet {
    curves: Vec<ReversalCurve>,
    warnings: Vec<ExtractionWarning>,
}

impl MeasurementSet {
    /// Create a set from curves already ordered by increasing `hb`.
    pub fn new(curves: Vec<ReversalCurve>) -> Result<Self> {
        Self::with_warnings(curves, Vec::new())
    }

    /// Create a set and attach the warnings recorded while building it.
    pub fn with_warnings(
        curves: Vec<ReversalCurve>,
        warnings: Vec<ExtractionWarning>,
    ) -> Result<Self> {
        if curves.is_empty() {
            return Err(Error::MalformedInput("measurement set has no curves".to_string()));
        }
        if let Some(i) = curves.windows(2).position(|w| w[1].hb() <= w[0].hb()) {
            return Err(Error::MalformedInput(format!(
                "curves must be ordered by strictly increasing hb (index {}: {} -> {})",
                i + 1,
                curves[i].hb(),
                curves[i + 1].hb()
            )));
        }
        Ok(Self { curves, warnings })
    }

    /// Curves in order of increasing reversal field.
    #[inline]
    pub fn curves(&self) -> &[ReversalCurve] {
        &self.curves
    }

    /// Number of curves.
    #[inline]
    pub fn n_curves(&self) -> usize {
        self.curves.len()
    }

    /// Total number of samples across all curves.
    pub fn n_samples(&self) -> usize {
        self.curves.iter().map(ReversalCurve::len).sum()
    }

    /// Warnings recorded while the set was built.
    pub fn warnings(&self) -> &[ExtractionWarning] {
        &self.warnings
    }

    /// Iterate over every sample, curve by curve.
    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.curves.iter().flat_map(ReversalCurve::samples)
    }

    /// Index of the curve whose reversal field is closest to `hb0`.
    pub fn nearest_curve(&self, hb0: f64) -> usize {
        let idx = self.curves.partition_point(|c| c.hb() < hb0);
        if idx == 0 {
            return 0;
        }
        if idx == self.curves.len() {
            return self.curves.len() - 1;
        }
        let below = hb0 - self.curves[idx - 1].hb();
        let above = self.curves[idx].hb() - hb0;
        if below <= above { idx - 1 } else { idx }
    }

    /// Index range `[lo, hi)` of curves with `hb` inside `[hb_lo, hb_hi]`.
    pub fn curve_range(&self, hb_lo: f64, hb_hi: f64) -> (usize, usize) {
        let lo = self.curves.partition_point(|c| c.hb() < hb_lo);
        let hi = self.curves.partition_point(|c| c.hb() <= hb_hi);
        (lo, hi.max(lo))
    }

    /// Median spacing between consecutive `ha` readings over all curves.
    ///
    /// `None` when no curve has more than one sample.
    pub fn field_step(&self) -> Option<f64> {
        let mut steps: Vec<f64> = self
            .curves
            .iter()
            .flat_map(|c| c.ha().windows(2).map(|w| w[1] - w[0]))
            .collect();
        if steps.is_empty() {
            return None;
        }
        steps.sort_by(f64::total_cmp);
        let n = steps.len();
        Some(if n % 2 == 1 { steps[n / 2] } else { 0.5 * (steps[n / 2 - 1] + steps[n / 2]) })
    }

    /// Bounding box of all samples in (ha, hb).
    pub fn extent(&self) -> FieldExtent {
        let mut ext = FieldExtent {
            ha_min: f64::INFINITY,
            ha_max: f64::NEG_INFINITY,
            hb_min: f64::INFINITY,
            hb_max: f64::NEG_INFINITY,
        };
        for c in &self.curves {
            ext.ha_min = ext.ha_min.min(c.ha()[0]);
            ext.ha_max = ext.ha_max.max(c.ha()[c.len() - 1]);
            ext.hb_min = ext.hb_min.min(c.hb());
            ext.hb_max = ext.hb_max.max(c.hb());
        }
        ext
    }

    /// New set with every magnetization replaced by `f(curve_index, sample)`.
    ///
    /// Field values, ordering and warnings carry over unchanged.
    pub fn map_magnetization<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(usize, Sample) -> f64,
    {
        let curves = self
            .curves
            .iter()
            .enumerate()
            .map(|(i, c)| c.with_magnetization(c.samples().map(|s| f(i, s)).collect()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { curves, warnings: self.warnings.clone() })
    }
}
