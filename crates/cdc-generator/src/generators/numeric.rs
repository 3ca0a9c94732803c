//! Numeric value generators.

use cdc_core::Value;
use rand::Rng;

/// Generate a random integer in the given range (inclusive).
pub fn generate_int_range<R: Rng>(rng: &mut R, min: i64, max: i64) -> Value {
    if min >= max {
        return Value::Int64(min);
    }
    Value::Int64(rng.gen_range(min..=max))
}

/// Generate a random float in the given range (inclusive).
pub fn generate_float_range<R: Rng>(rng: &mut R, min: f64, max: f64) -> Value {
    if min >= max {
        return Value::Float64(min);
    }
    Value::Float64(rng.gen_range(min..=max))
}

/// Generate a random decimal in the given range, rendered with `scale`
/// fractional digits.
pub fn generate_decimal_range<R: Rng>(rng: &mut R, min: f64, max: f64, scale: u8) -> Value {
    let value = if min >= max {
        min
    } else {
        rng.gen_range(min..=max)
    };
    Value::Decimal(format!("{:.*}", scale as usize, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_int_range() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let value = generate_int_range(&mut rng, 10, 20);
            if let Value::Int64(v) = value {
                assert!((10..=20).contains(&v));
            } else {
                panic!("Expected Int64 value");
            }
        }
    }

    #[test]
    fn test_generate_float_range() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let value = generate_float_range(&mut rng, 0.0, 100.0);
            if let Value::Float64(v) = value {
                assert!((0.0..=100.0).contains(&v));
            } else {
                panic!("Expected Float64 value");
            }
        }
    }

    #[test]
    fn test_generate_decimal_range() {
        let mut rng = StdRng::seed_from_u64(42);

        let value = generate_decimal_range(&mut rng, 0.0, 100.0, 2);
        if let Value::Decimal(text) = value {
            let parsed: f64 = text.parse().unwrap();
            assert!((0.0..=100.0).contains(&parsed));
            assert_eq!(text.split('.').nth(1).map(str::len), Some(2));
        } else {
            panic!("Expected Decimal value");
        }
    }

    #[test]
    fn test_degenerate_range() {
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(generate_int_range(&mut rng, 7, 7), Value::Int64(7));
        assert_eq!(generate_int_range(&mut rng, 9, 3), Value::Int64(9));
    }
}
