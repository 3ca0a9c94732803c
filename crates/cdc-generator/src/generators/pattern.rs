//! Pattern-based string generator.
//!
//! Supports placeholders:
//! - `{index}` - per-table insert ordinal
//! - `{uuid}` - random UUID drawn from the seeded RNG
//! - `{rand:N}` - random N-digit number

use super::uuid::random_uuid_v4;
use cdc_core::Value;
use rand::Rng;

/// Generate a string based on a pattern with placeholders.
pub fn generate_pattern<R: Rng>(pattern: &str, rng: &mut R, index: u64) -> Value {
    let mut result = pattern.replace("{index}", &index.to_string());

    while result.contains("{uuid}") {
        result = result.replacen("{uuid}", &random_uuid_v4(rng).to_string(), 1);
    }

    // Replace {rand:N} left to right; an unparsable width stops substitution.
    let mut search_from = 0;
    while let Some(offset) = result[search_from..].find("{rand:") {
        let start = search_from + offset;
        let Some(len) = result[start..].find('}') else {
            break;
        };
        let end = start + len;
        let Ok(digits) = result[start + 6..end].parse::<usize>() else {
            break;
        };
        let random_num = generate_random_digits(rng, digits);
        result = format!("{}{}{}", &result[..start], random_num, &result[end + 1..]);
        search_from = start + random_num.len();
    }

    Value::Text(result)
}

/// Generate a random number with exactly N digits.
fn generate_random_digits<R: Rng>(rng: &mut R, digits: usize) -> String {
    if digits == 0 {
        return String::new();
    }

    let mut result = String::with_capacity(digits);

    // First digit should be 1-9 to avoid leading zeros
    result.push(char::from(b'0' + rng.gen_range(1..10u8)));

    for _ in 1..digits {
        result.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_pattern_index() {
        let mut rng = StdRng::seed_from_u64(42);
        let value = generate_pattern("user_{index}@example.com", &mut rng, 123);

        assert_eq!(value, Value::Text("user_123@example.com".to_string()));
    }

    #[test]
    fn test_generate_pattern_uuid_is_seeded() {
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(42);
        let value1 = generate_pattern("id-{uuid}", &mut rng1, 0);
        let value2 = generate_pattern("id-{uuid}", &mut rng2, 0);

        assert_eq!(value1, value2);
        if let Value::Text(s) = value1 {
            assert!(s.starts_with("id-"));
            assert_eq!(s.len(), 3 + 36);
        } else {
            panic!("Expected Text value");
        }
    }

    #[test]
    fn test_generate_pattern_random_digits() {
        let mut rng = StdRng::seed_from_u64(42);
        let value = generate_pattern("code-{rand:6}", &mut rng, 0);

        if let Value::Text(s) = value {
            assert!(s.starts_with("code-"));
            assert_eq!(s.len(), 5 + 6);
            assert!(s[5..].chars().all(|c| c.is_ascii_digit()));
        } else {
            panic!("Expected Text value");
        }
    }

    #[test]
    fn test_generate_pattern_multiple_placeholders() {
        let mut rng = StdRng::seed_from_u64(42);
        let value = generate_pattern("user_{index}_code_{rand:4}_{rand:2}", &mut rng, 42);

        if let Value::Text(s) = value {
            assert!(s.starts_with("user_42_code_"));
            assert_eq!(s.len(), 13 + 4 + 1 + 2);
        } else {
            panic!("Expected Text value");
        }
    }

    #[test]
    fn test_invalid_width_left_verbatim() {
        let mut rng = StdRng::seed_from_u64(42);
        let value = generate_pattern("x-{rand:abc}", &mut rng, 0);
        assert_eq!(value, Value::Text("x-{rand:abc}".to_string()));
    }
}
