//! # Continued Fractions
//!
//! Converts the aggregator's floating-point protocol parameters into the
//! exact numerator/denominator pairs the light client expects.

use crate::domain::{Fraction, GatewayError};

/// Maximum approximation error accepted.
pub const FRACTION_TOLERANCE: f64 = 1e-6;

/// Upper bound on continued-fraction terms.
const MAX_TERMS: usize = 64;

/// Approximate `value` with the first convergent within [`FRACTION_TOLERANCE`].
pub fn double_to_fraction(value: f64) -> Result<Fraction, GatewayError> {
    if !value.is_finite() || value < 0.0 {
        return Err(GatewayError::invalid(format!(
            "cannot convert {} to a non-negative fraction",
            value
        )));
    }

    // Convergents h/k via h_n = a_n*h_{n-1} + h_{n-2}.
    let (mut h_prev, mut h) = (0u64, 1u64);
    let (mut k_prev, mut k) = (1u64, 0u64);
    let mut x = value;

    for _ in 0..MAX_TERMS {
        let a = x.floor();
        if a > u64::MAX as f64 {
            break;
        }
        let a = a as u64;
        let (Some(h_next), Some(k_next)) = (
            a.checked_mul(h).and_then(|v| v.checked_add(h_prev)),
            a.checked_mul(k).and_then(|v| v.checked_add(k_prev)),
        ) else {
            break;
        };
        h_prev = h;
        h = h_next;
        k_prev = k;
        k = k_next;

        if (value - h as f64 / k as f64).abs() < FRACTION_TOLERANCE {
            break;
        }
        let frac = x - a as f64;
        if frac <= f64::EPSILON {
            break;
        }
        x = 1.0 / frac;
    }

    if k == 0 {
        return Err(GatewayError::invalid(format!(
            "cannot approximate {} as a fraction",
            value
        )));
    }
    Ok(Fraction {
        numerator: h,
        denominator: k,
    })
}
