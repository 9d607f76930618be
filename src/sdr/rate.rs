//! Rational sample-rate negotiation.
//!
//! The device takes its sample rate as an exact integer fraction. Requests
//! arrive as floating-point samples/second, so the fractional part is scaled
//! by a fixed precision denominator and reduced.

/// Accuracy of the fractional part: one part in 1e9.
pub const RATE_PRECISION: i64 = 1_000_000_000;

fn gcd(a: i64, b: i64) -> i64 {
    if a == 0 {
        return b;
    } else if b == 0 {
        return a;
    }

    if a < b {
        gcd(a, b % a)
    } else {
        gcd(b, a % b)
    }
}

/// Convert a rate in samples/second into an exact (numerator, denominator)
/// pair with `num / den ≈ rate` to within one part in [`RATE_PRECISION`].
///
/// Integral rates fall out of the same path: gcd(0, p) = p reduces the
/// denominator to 1. Range checking is the caller's job.
pub fn rate_to_fraction(rate: f64) -> (i64, i64) {
    let integral = rate.floor();
    let frac = rate - integral;

    let g = gcd((frac * RATE_PRECISION as f64).round() as i64, RATE_PRECISION);

    let denominator = RATE_PRECISION / g;
    let numerator = (frac * RATE_PRECISION as f64).round() as i64 / g;

    (integral as i64 * denominator + numerator, denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_rate_reduces_to_unit_denominator() {
        let (num, den) = rate_to_fraction(1_500_000.0);
        assert_eq!(num, 1_500_000);
        assert_eq!(den, 1);
    }

    #[test]
    fn minimum_rate() {
        let (num, den) = rate_to_fraction(400e3);
        assert_eq!(num, 400_000);
        assert_eq!(den, 1);
    }

    #[test]
    fn fractional_rate_is_exact_within_precision() {
        for &rate in &[1_234_567.89, 2_000_000.5, 19_999_999.999, 400_000.125] {
            let (num, den) = rate_to_fraction(rate);
            assert!(den > 0);
            let approx = num as f64 / den as f64;
            assert!(
                (approx - rate).abs() < 1e-6 * rate,
                "rate {} -> {}/{} = {}",
                rate,
                num,
                den,
                approx
            );
        }
    }

    #[test]
    fn denominator_divides_precision() {
        let (_, den) = rate_to_fraction(1_000_000.25);
        assert_eq!(RATE_PRECISION % den, 0);
        assert_eq!(den, 4);
    }

    #[test]
    fn half_sample_rates() {
        let (num, den) = rate_to_fraction(1_500_000.5);
        assert_eq!(den, 2);
        assert_eq!(num, 3_000_001);
    }
}
