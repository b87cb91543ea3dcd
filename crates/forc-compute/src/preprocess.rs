//! Optional corrections applied to a measurement set before differentiation.
//!
//! Every step returns a new [`MeasurementSet`]; field values and curve
//! structure are untouched, only magnetization changes.

use forc_core::{
    DriftCorrection, Error, MeasurementSet, PreprocessConfig, Result, SlopeCorrection,
};
use nalgebra::{DMatrix, DVector};

/// Apply the enabled steps in order: drift, slope, rescale.
pub fn apply(data: &MeasurementSet, config: &PreprocessConfig) -> Result<MeasurementSet> {
    config.validate()?;
    let mut out = data.clone();
    if let Some(drift) = &config.drift {
        out = correct_drift(&out, drift)?;
    }
    if let Some(slope) = &config.slope {
        out = correct_slope(&out, slope)?;
    }
    if config.rescale {
        out = rescale_magnetization(&out)?;
    }
    Ok(out)
}

/// Remove slow drift of the saturation magnetization across the measurement.
///
/// The last reading of every curve is taken at saturation and serves as a
/// drift point. The drift points are smoothed with a centred moving average,
/// every `density`-th smoothed value (plus the last) becomes an interpolation
/// node, and each curve is shifted by the interpolated deviation from the mean
/// saturation magnetization.
pub fn correct_drift(data: &MeasurementSet, params: &DriftCorrection) -> Result<MeasurementSet> {
    if params.density == 0 {
        return Err(Error::Configuration("drift density must be >= 1".to_string()));
    }
    let n = data.n_curves();
    if n < 2 {
        return Err(Error::Computation(format!(
            "drift correction needs at least 2 curves, got {n}"
        )));
    }

    let drift: Vec<f64> = data.curves().iter().map(|c| c.m()[c.len() - 1]).collect();
    let mean = drift.iter().sum::<f64>() / n as f64;

    let smoothed = moving_average(&drift, params.kernel_size);
    let nodes_x = decimate(&(0..n).map(|i| i as f64).collect::<Vec<_>>(), params.density);
    let nodes_y = decimate(&smoothed, params.density);

    let offsets: Vec<f64> =
        (0..n).map(|i| interp_linear(&nodes_x, &nodes_y, i as f64) - mean).collect();
    log::debug!(
        "drift correction: mean saturation m={mean}, max offset={}",
        offsets.iter().fold(0.0f64, |a, &b| a.max(b.abs()))
    );
    data.map_magnetization(|i, s| s.m - offsets[i])
}

/// Subtract a background linear in the applied field, fitted where the sample is saturated.
pub fn correct_slope(data: &MeasurementSet, params: &SlopeCorrection) -> Result<MeasurementSet> {
    let (h, m): (Vec<f64>, Vec<f64>) =
        data.samples().filter(|s| s.ha.abs() > params.h_sat).map(|s| (s.ha, s.m)).unzip();
    if h.len() < 2 {
        return Err(Error::Computation(format!(
            "slope correction needs at least 2 samples with |ha| > {}, got {}",
            params.h_sat,
            h.len()
        )));
    }

    let (slope, intercept) = fit_line(&h, &m)?;
    log::debug!("slope correction: slope={slope}, intercept={intercept} from {} samples", h.len());
    data.map_magnetization(|_, s| s.m - slope * s.ha)
}

/// Map magnetization linearly onto [-1, 1].
pub fn rescale_magnetization(data: &MeasurementSet) -> Result<MeasurementSet> {
    let (lo, hi) = data
        .samples()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s.m), hi.max(s.m)));
    let span = hi - lo;
    if !span.is_finite() || span <= 0.0 {
        return Err(Error::Computation(
            "cannot rescale magnetization: all values are equal".to_string(),
        ));
    }
    data.map_magnetization(|_, s| 2.0 * (s.m - lo) / span - 1.0)
}

/// Least-squares line `y = slope * x + intercept`.
fn fit_line(x: &[f64], y: &[f64]) -> Result<(f64, f64)> {
    let n = x.len() as f64;
    let sx: f64 = x.iter().sum();
    let sxx: f64 = x.iter().map(|v| v * v).sum();
    let sy: f64 = y.iter().sum();
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();

    let a = DMatrix::from_row_slice(2, 2, &[sxx, sx, sx, n]);
    let b = DVector::from_vec(vec![sxy, sy]);
    let sol = a.lu().solve(&b).ok_or_else(|| {
        Error::Computation("slope fit failed (all fit samples share one field)".to_string())
    })?;
    if !sol[0].is_finite() || !sol[1].is_finite() {
        return Err(Error::Computation("slope fit produced non-finite coefficients".to_string()));
    }
    Ok((sol[0], sol[1]))
}

/// Centred moving average of width `2 * half_width + 1`, edges padded with the nearest value.
fn moving_average(values: &[f64], half_width: usize) -> Vec<f64> {
    let n = values.len();
    let window = (2 * half_width + 1) as f64;
    (0..n)
        .map(|i| {
            let sum: f64 = (0..=2 * half_width)
                .map(|k| {
                    let j = (i + k).saturating_sub(half_width).min(n - 1);
                    values[j]
                })
                .sum();
            sum / window
        })
        .collect()
}

/// Every `step`-th value starting at the first, always including the last.
fn decimate(values: &[f64], step: usize) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().step_by(step).collect();
    if (values.len() - 1) % step != 0 {
        out.push(values[values.len() - 1]);
    }
    out
}

/// Piecewise-linear interpolation through ascending nodes, clamped at the ends.
fn interp_linear(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let k = xs.partition_point(|&v| v <= x);
    if k == 0 {
        return ys[0];
    }
    if k == xs.len() {
        return ys[xs.len() - 1];
    }
    let t = (x - xs[k - 1]) / (xs[k] - xs[k - 1]);
    ys[k - 1] + t * (ys[k] - ys[k - 1])
}
