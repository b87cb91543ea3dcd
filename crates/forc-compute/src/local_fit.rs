//! Local second-order polynomial surface fit.
//!
//! Model, centred on the evaluation point `(ha0, hb0)`:
//!
//! `m ≈ a + b·x + c·y + d·x² + e·y² + f·x·y`, `x = ha − ha0`, `y = hb − hb0`.
//!
//! The design matrix is built on coordinates scaled by the neighborhood's
//! half-extent along each axis, solved by SVD, and the coefficients mapped
//! back to field units. Centring leaves `f` (the mixed second derivative)
//! unchanged.

use forc_core::Sample;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

/// Number of polynomial coefficients.
pub const N_COEFFS: usize = 6;

/// Singular values below `RANK_RTOL * sigma_max` count as zero.
const RANK_RTOL: f64 = 1e-10;

/// Why a grid point has no density estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitFailure {
    /// Grid point outside the measured region.
    OutsideData,
    /// Fewer samples than coefficients.
    Underdetermined,
    /// Samples do not determine every coefficient (e.g. all on one curve).
    Singular,
}

/// Coefficients `[a, b, c, d, e, f]` of a fitted surface, in field units,
/// centred on the evaluation point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticFit {
    /// Polynomial coefficients.
    pub coeffs: [f64; N_COEFFS],
    /// Samples used.
    pub n_samples: usize,
}

impl QuadraticFit {
    /// Mixed second partial derivative ∂²m/∂ha∂hb.
    #[inline]
    pub fn mixed(&self) -> f64 {
        self.coeffs[5]
    }

    /// Fitted magnetization at the evaluation point.
    #[inline]
    pub fn value(&self) -> f64 {
        self.coeffs[0]
    }
}

/// Least-squares quadratic surface through `samples`, centred on `(ha0, hb0)`.
pub fn fit_quadratic(samples: &[Sample], ha0: f64, hb0: f64) -> Result<QuadraticFit, FitFailure> {
    let n = samples.len();
    if n < N_COEFFS {
        return Err(FitFailure::Underdetermined);
    }

    let (sx, sy) = samples.iter().fold((0.0f64, 0.0f64), |(sx, sy), s| {
        (sx.max((s.ha - ha0).abs()), sy.max((s.hb - hb0).abs()))
    });
    if !(sx > 0.0 && sy > 0.0) {
        return Err(FitFailure::Singular);
    }

    let a = DMatrix::from_fn(n, N_COEFFS, |r, c| {
        let x = (samples[r].ha - ha0) / sx;
        let y = (samples[r].hb - hb0) / sy;
        match c {
            0 => 1.0,
            1 => x,
            2 => y,
            3 => x * x,
            4 => y * y,
            _ => x * y,
        }
    });
    let b = DVector::from_iterator(n, samples.iter().map(|s| s.m));

    let svd = a.svd(true, true);
    let sigma_max = svd.singular_values.max();
    let tol = RANK_RTOL * sigma_max;
    if !(sigma_max > 0.0) || svd.rank(tol) < N_COEFFS {
        return Err(FitFailure::Singular);
    }
    let sol = svd.solve(&b, tol).map_err(|_| FitFailure::Singular)?;

    let coeffs = [
        sol[0],
        sol[1] / sx,
        sol[2] / sy,
        sol[3] / (sx * sx),
        sol[4] / (sy * sy),
        sol[5] / (sx * sy),
    ];
    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(FitFailure::Singular);
    }
    Ok(QuadraticFit { coeffs, n_samples: n })
}
