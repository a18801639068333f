//! Shared date serialization
//!
//! Manifests and fileset volume names both use the compact UTC form
//! `yyyyMMdd'T'HHmmss'Z'` (e.g. `20240115T103000Z`).

use crate::error::{Result, VolumeError};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

const FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Serialize a UTC timestamp (sub-second precision is dropped)
pub fn serialize(time: &DateTime<Utc>) -> String {
    time.format(FORMAT).to_string()
}

/// Parse a timestamp produced by [`serialize`]
pub fn parse(text: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| VolumeError::InvalidTimestamp(format!("{}: {}", text, e)))
}

/// Current time truncated to whole seconds, so it survives a serialize/parse
/// round trip unchanged.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_serialize_format() {
        let time = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(serialize(&time), "20240115T103000Z");
    }

    #[test]
    fn test_parse_roundtrip() {
        let time = now();
        assert_eq!(parse(&serialize(&time)).unwrap(), time);
    }

    #[test]
    fn test_parse_rejects_impossible_date() {
        let err = parse("20241345T999999Z").unwrap_err();
        assert!(matches!(err, VolumeError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_parse_rejects_missing_designator() {
        assert!(parse("20240115T103000").is_err());
    }
}
