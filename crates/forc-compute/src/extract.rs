//! Curve extraction: raw `(ha, hb, m)` readings → [`MeasurementSet`].
//!
//! Readings are grouped into reversal curves by their reversal field, using an
//! explicit tolerance because the instrument's field readings are noisy. The
//! grouping is anchor-based: a curve collects every reading within
//! `hb_tolerance` of its *first* (lowest) reversal field, so a slow walk of
//! noisy values can never chain two distinct curves into one.
//!
//! Inside each curve, in acquisition order:
//! 1. the first `trim_points` readings are dropped (post-reversal transient),
//! 2. readings with `ha` below their own reversal field are dropped (non-physical),
//! 3. the rest is sorted by `ha` and repeated `ha` readings are dropped.
//!
//! The curve's reversal field is the mean of its members, never above the
//! first kept `ha`. Curves left with fewer than two readings are removed with a
//! warning; if no curve survives the call fails.

use forc_core::{
    Error, ExtractConfig, ExtractionWarning, MeasurementSet, Result, ReversalCurve, Sample,
};

/// Minimum readings a curve must keep to take part in differentiation.
pub const MIN_CURVE_POINTS: usize = 2;

/// Group raw readings into reversal curves.
pub fn extract(raw: &[Sample], config: &ExtractConfig) -> Result<MeasurementSet> {
    config.validate()?;
    if raw.is_empty() {
        return Err(Error::MalformedInput("no samples".to_string()));
    }
    if let Some(i) = raw.iter().position(|s| !s.is_finite()) {
        return Err(Error::MalformedInput(format!(
            "sample {} is not finite: ({}, {}, {})",
            i, raw[i].ha, raw[i].hb, raw[i].m
        )));
    }

    let groups = group_by_reversal_field(raw, config.hb_tolerance);
    let n_groups = groups.len();

    let mut curves = Vec::with_capacity(n_groups);
    let mut warnings = Vec::new();
    for members in groups {
        if let Some(curve) = build_curve(raw, &members, config.trim_points, &mut warnings)? {
            curves.push(curve);
        }
    }

    if curves.is_empty() {
        return Err(Error::MalformedInput(format!(
            "all {n_groups} reversal curve(s) have fewer than {MIN_CURVE_POINTS} points \
             after trimming"
        )));
    }

    log::debug!(
        "extracted {} curve(s) from {} sample(s); {} warning(s)",
        curves.len(),
        raw.len(),
        warnings.len()
    );
    MeasurementSet::with_warnings(curves, warnings)
}

/// Build a set from per-curve sweeps of `(h, m)` readings.
///
/// The reversal field of a sweep is the applied field of its first reading.
/// Sweeps whose reversal fields fall within `hb_tolerance` are merged.
pub fn extract_sweeps(
    sweeps: &[Vec<(f64, f64)>],
    config: &ExtractConfig,
) -> Result<MeasurementSet> {
    let raw: Vec<Sample> = sweeps
        .iter()
        .filter_map(|sweep| {
            let hb = sweep.first()?.0;
            Some(sweep.iter().map(move |&(ha, m)| Sample { ha, hb, m }))
        })
        .flatten()
        .collect();
    extract(&raw, config)
}

/// Indices of `raw`, grouped by reversal field; groups ascend in `hb`, members keep input order.
fn group_by_reversal_field(raw: &[Sample], tolerance: f64) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| raw[a].hb.total_cmp(&raw[b].hb));

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut anchor = f64::NEG_INFINITY;
    for idx in order {
        let hb = raw[idx].hb;
        match groups.last_mut() {
            Some(group) if hb - anchor <= tolerance => group.push(idx),
            _ => {
                anchor = hb;
                groups.push(vec![idx]);
            }
        }
    }
    for group in &mut groups {
        group.sort_unstable();
    }
    groups
}

fn build_curve(
    raw: &[Sample],
    members: &[usize],
    trim_points: usize,
    warnings: &mut Vec<ExtractionWarning>,
) -> Result<Option<ReversalCurve>> {
    let readings: Vec<f64> = members.iter().map(|&i| raw[i].hb).collect();
    let lo = readings.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = readings.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = readings.iter().sum::<f64>() / readings.len() as f64;
    // The mean of equal readings can round past them.
    let hb = mean.clamp(lo, hi);

    let trimmed = members.iter().skip(trim_points).map(|&i| raw[i]);
    let mut points: Vec<(f64, f64)> = Vec::with_capacity(members.len());
    let mut n_non_physical = 0usize;
    for s in trimmed {
        if s.ha < s.hb {
            n_non_physical += 1;
        } else {
            points.push((s.ha, s.m));
        }
    }
    if n_non_physical > 0 {
        warnings.push(ExtractionWarning::NonPhysicalPoints { hb, count: n_non_physical });
    }

    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    let n_before = points.len();
    points.dedup_by(|later, kept| later.0 <= kept.0);
    let n_duplicates = n_before - points.len();
    if n_duplicates > 0 {
        warnings.push(ExtractionWarning::DuplicatePoints { hb, count: n_duplicates });
    }

    if points.len() < MIN_CURVE_POINTS {
        log::warn!("dropping reversal curve at hb={hb}: {} point(s) left", points.len());
        warnings.push(ExtractionWarning::CurveDropped { hb, remaining: points.len() });
        return Ok(None);
    }

    let (ha, m): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
    ReversalCurve::new(hb.min(ha[0]), ha, m).map(Some)
}
