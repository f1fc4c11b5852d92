// Copyright 2025
// Licensed under the Elastic License v2.0

//! Row normalization: `RawRecord` to `CanonicalRecord`.
//!
//! Total by construction. A measure that is NULL, empty, the `NA` sentinel
//! or not parseable as its column type becomes `None`.

use chrono::{NaiveDateTime, Utc};

use crate::core::{CanonicalRecord, RawRecord};

const NOT_AVAILABLE: &str = "NA";

/// Normalizes a record, stamping it with the current UTC time.
pub fn normalize(raw: RawRecord) -> CanonicalRecord {
    normalize_at(raw, Utc::now().naive_utc())
}

/// Normalizes a record with an explicit ingestion time.
///
/// A batch is stamped once so all its rows share `time_submitted`.
pub fn normalize_at(raw: RawRecord, ingested_at: NaiveDateTime) -> CanonicalRecord {
    CanonicalRecord {
        id: raw.id,
        country_code: raw.country_code.trim().to_uppercase(),
        escs: decimal(raw.escs.as_deref()),
        tmins: integer(raw.tmins.as_deref()),
        belong: decimal(raw.belong.as_deref()),
        durecec: integer(raw.durecec.as_deref()),
        ingested_at,
    }
}

/// Trimmed value, or `None` for NULL, empty and `NA`.
fn present(value: Option<&str>) -> Option<&str> {
    let value = value?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case(NOT_AVAILABLE) {
        None
    } else {
        Some(value)
    }
}

fn decimal(value: Option<&str>) -> Option<f64> {
    present(value)?.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Accepts `12` and integral decimals such as `12.0`.
fn integer(value: Option<&str>) -> Option<i32> {
    let value = present(value)?;
    if let Ok(v) = value.parse::<i32>() {
        return Some(v);
    }
    let v = value.parse::<f64>().ok()?;
    if v.fract() == 0.0 && v >= i32::MIN as f64 && v <= i32::MAX as f64 {
        Some(v as i32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn raw(escs: Option<&str>, tmins: Option<&str>) -> RawRecord {
        RawRecord {
            id: 1,
            country_code: "ALB".to_string(),
            escs: escs.map(str::to_string),
            tmins: tmins.map(str::to_string),
            belong: Some("0.25".to_string()),
            durecec: Some("4".to_string()),
        }
    }

    #[test]
    fn test_values_pass_through() {
        let record = normalize_at(raw(Some("-1.2345"), Some("270")), at());
        assert_eq!(record.id, 1);
        assert_eq!(record.country_code, "ALB");
        assert_eq!(record.escs, Some(-1.2345));
        assert_eq!(record.tmins, Some(270));
        assert_eq!(record.belong, Some(0.25));
        assert_eq!(record.durecec, Some(4));
        assert_eq!(record.ingested_at, at());
    }

    #[test]
    fn test_sentinels_become_absent() {
        for sentinel in [None, Some(""), Some("NA"), Some(" na "), Some("Na")] {
            let record = normalize_at(raw(sentinel, sentinel), at());
            assert_eq!(record.escs, None, "escs for {:?}", sentinel);
            assert_eq!(record.tmins, None, "tmins for {:?}", sentinel);
        }
    }

    #[test]
    fn test_unparseable_values_become_absent() {
        let record = normalize_at(raw(Some("n/a"), Some("lots")), at());
        assert_eq!(record.escs, None);
        assert_eq!(record.tmins, None);

        let record = normalize_at(raw(Some("NaN"), Some("12.5")), at());
        assert_eq!(record.escs, None);
        assert_eq!(record.tmins, None);
    }

    #[test]
    fn test_integral_decimal_is_accepted_as_integer() {
        let record = normalize_at(raw(Some("1"), Some("270.0")), at());
        assert_eq!(record.tmins, Some(270));
        assert_eq!(record.escs, Some(1.0));
    }

    #[test]
    fn test_country_code_is_trimmed_and_upper_cased() {
        let mut input = raw(None, None);
        input.country_code = " arg ".to_string();
        assert_eq!(normalize_at(input, at()).country_code, "ARG");
    }

    #[test]
    fn test_normalize_stamps_current_time() {
        let before = Utc::now().naive_utc();
        let record = normalize(raw(None, None));
        assert!(record.ingested_at >= before);
    }
}
