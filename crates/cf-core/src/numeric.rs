use crate::CfError;

/// Floating point type used throughout the system.
pub type Real = f64;

#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CfError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CfError::NonFinite { what, value: v })
    }
}

/// Replace NaN/inf with zero. Used on diagnostic outputs that must stay
/// serialisable even when a denominator collapses.
pub fn finite_or_zero(v: Real) -> Real {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Bisection root finder on a bracket `[lo, hi]` where `f(lo)` and `f(hi)`
/// have opposite signs (or one of them is zero).
///
/// Returns `None` when the bracket does not contain a sign change.
pub fn bisect<F>(mut lo: Real, mut hi: Real, tol: Real, max_iter: usize, f: F) -> Option<Real>
where
    F: Fn(Real) -> Real,
{
    let mut f_lo = f(lo);
    let f_hi = f(hi);
    if f_lo == 0.0 {
        return Some(lo);
    }
    if f_hi == 0.0 {
        return Some(hi);
    }
    if f_lo.signum() == f_hi.signum() {
        return None;
    }

    for _ in 0..max_iter {
        let mid = 0.5 * (lo + hi);
        let f_mid = f(mid);
        if f_mid == 0.0 || (hi - lo) < tol {
            return Some(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}
