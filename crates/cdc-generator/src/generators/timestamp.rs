//! Timestamp value generators.

use cdc_core::Value;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;

/// Generate a random timestamp in the given range, at second precision.
///
/// The start and end should be RFC 3339 timestamps or `YYYY-MM-DD` dates.
/// Unparsable bounds fall back to the other bound, then to the Unix epoch.
pub fn generate_timestamp_range<R: Rng>(rng: &mut R, start: &str, end: &str) -> Value {
    match (parse_timestamp(start), parse_timestamp(end)) {
        (Some(start), Some(end)) => {
            let start_ts = start.timestamp();
            let end_ts = end.timestamp();

            if start_ts >= end_ts {
                Value::Timestamp(start)
            } else {
                let random_ts = rng.gen_range(start_ts..=end_ts);
                let dt = DateTime::from_timestamp(random_ts, 0).unwrap_or(start);
                Value::Timestamp(dt)
            }
        }
        (Some(dt), None) | (None, Some(dt)) => Value::Timestamp(dt),
        (None, None) => Value::Timestamp(DateTime::<Utc>::UNIX_EPOCH),
    }
}

/// Parse a timestamp string in RFC 3339 or date-only format.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_timestamp_range() {
        let mut rng = StdRng::seed_from_u64(42);

        let value =
            generate_timestamp_range(&mut rng, "2020-01-01T00:00:00Z", "2024-12-31T23:59:59Z");

        if let Value::Timestamp(dt) = value {
            assert!(dt.year() >= 2020 && dt.year() <= 2024);
        } else {
            panic!("Expected Timestamp value");
        }
    }

    #[test]
    fn test_generate_timestamp_with_dates_only() {
        let mut rng = StdRng::seed_from_u64(42);

        let value = generate_timestamp_range(&mut rng, "2020-01-01", "2024-12-31");

        if let Value::Timestamp(dt) = value {
            assert!(dt.year() >= 2020 && dt.year() <= 2024);
        } else {
            panic!("Expected Timestamp value");
        }
    }

    #[test]
    fn test_unparsable_bounds_are_deterministic() {
        let mut rng = StdRng::seed_from_u64(42);
        let value = generate_timestamp_range(&mut rng, "soon", "later");
        assert_eq!(value, Value::Timestamp(DateTime::<Utc>::UNIX_EPOCH));
    }

    #[test]
    fn test_deterministic_generation() {
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(42);

        let value1 =
            generate_timestamp_range(&mut rng1, "2020-01-01T00:00:00Z", "2024-12-31T23:59:59Z");
        let value2 =
            generate_timestamp_range(&mut rng2, "2020-01-01T00:00:00Z", "2024-12-31T23:59:59Z");

        assert_eq!(value1, value2);
    }
}
