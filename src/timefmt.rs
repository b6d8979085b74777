//! RFC-3339-without-fraction timestamp codec matching the cluster-side
//! annotation contract layout `2006-01-02T15:04:05Z` (UTC, `Z` suffix, no
//! sub-second digits). Anything else is treated as unparsable by callers,
//! never as a different-but-valid format to coerce.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::Result;

const LAYOUT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.format(LAYOUT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, LAYOUT)?;
    Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let dt: DateTime<Utc> = "2025-01-07T01:00:00Z".parse().unwrap();
        assert_eq!(format_timestamp(dt), "2025-01-07T01:00:00Z");
        assert_eq!(parse_timestamp("2025-01-07T01:00:00Z").unwrap(), dt);
    }

    #[test]
    fn rejects_other_layouts() {
        assert!(parse_timestamp("2025-01-07 01:00:00").is_err());
        assert!(parse_timestamp("2025-01-07T01:00:00.000Z").is_err());
        assert!(parse_timestamp("not a timestamp").is_err());
    }
}
