//! Tag comparison and recency rules used by the merge policy.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::ReconError;
use crate::model::{PointRecord, Tags};

/// A key both sides define with different values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChange {
    pub key: String,
    pub existing: String,
    pub incoming: String,
}

/// True iff every key `a` defines that `b` also defines has the same value.
/// Keys missing from `b` never conflict.
pub fn has_no_conflicts(a: &Tags, b: &Tags) -> bool {
    a.iter().all(|(k, v)| b.get(k).map_or(true, |other| other == v))
}

/// True if applying `incoming` onto `existing` would change anything.
pub fn differs(existing: &Tags, incoming: &Tags) -> bool {
    incoming.iter().any(|(k, v)| existing.get(k) != Some(v))
}

/// Keys defined by both sides with differing values, minus `exempt` keys.
///
/// Keys only `incoming` defines are additions, not conflicts.
pub fn conflicting_changes(existing: &Tags, incoming: &Tags, exempt: &[String]) -> Vec<TagChange> {
    existing
        .iter()
        .filter(|(k, _)| !exempt.iter().any(|e| e == *k))
        .filter_map(|(k, v)| match incoming.get(k) {
            Some(new) if new != v => Some(TagChange {
                key: k.clone(),
                existing: v.clone(),
                incoming: new.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// `existing` with `incoming` applied on top; incoming wins on overlap.
pub fn merge_tags(existing: &Tags, incoming: &Tags) -> Tags {
    let mut merged = existing.clone();
    merged.extend(incoming.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// The instant a record was last verified: the first present tag of
/// `timestamp_tags`, else the record's last-modification timestamp.
///
/// A present but unparseable value is an error, never skipped.
pub fn effective_timestamp(
    record: &PointRecord,
    timestamp_tags: &[String],
) -> Result<DateTime<Utc>, ReconError> {
    for tag in timestamp_tags {
        if let Some(value) = record.tag(tag) {
            return parse_timestamp(value).ok_or_else(|| ReconError::TimestampParse {
                record: record.label(),
                tag: Some(tag.clone()),
                value: value.to_string(),
            });
        }
    }
    parse_timestamp(&record.timestamp).ok_or_else(|| ReconError::TimestampParse {
        record: record.label(),
        tag: None,
        value: record.timestamp.clone(),
    })
}

/// Parse an RFC 3339 instant, a `YYYY-MM-DD` date or a `YYYY-MM` month.
/// Dates and months map to their first instant (00:00 UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
