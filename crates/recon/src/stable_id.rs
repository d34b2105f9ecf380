//! Reproducible natural keys for records without a shared primary key.
//!
//! Records are grouped by a grouping tag (the street key), sorted inside each
//! group by (category, latitude, longitude), and the 0-based rank in that
//! order becomes part of the id: `<group><sep><category><sep><rank>`.
//!
//! The same scheme runs over both datasets, so a tree keeps its id across
//! runs as long as its street key and its relative order among siblings do
//! not change. Inserting a sibling that sorts earlier shifts every later
//! rank; that is not corrected here.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::debug;

use crate::config::StableIdConfig;
use crate::model::PointRecord;

/// Compute the stable id for every record, without touching the records.
///
/// The returned vector is index-aligned with `records`; records whose
/// grouping tag is missing or empty get `None`.
pub fn compute_stable_ids(records: &[PointRecord], scheme: &StableIdConfig) -> Vec<Option<String>> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        match record.tag(&scheme.group_tag) {
            Some(key) if !key.is_empty() => groups.entry(key).or_default().push(i),
            _ => {}
        }
    }

    let mut ids = vec![None; records.len()];
    for (group_key, mut members) in groups {
        members.sort_by(|&a, &b| compare_siblings(&records[a], &records[b], scheme));
        for (rank, idx) in members.into_iter().enumerate() {
            let category = category_of(&records[idx], scheme);
            ids[idx] = Some(format!(
                "{group_key}{sep}{category}{sep}{rank}",
                sep = scheme.separator
            ));
        }
    }
    ids
}

/// Write the computed ids into each record's id tag. Returns how many
/// records received an id. Records without a grouping key are left as they
/// are, including any id tag they already carry.
pub fn assign_stable_ids(records: &mut [PointRecord], scheme: &StableIdConfig) -> usize {
    let ids = compute_stable_ids(records, scheme);
    let mut assigned = 0;
    for (record, id) in records.iter_mut().zip(ids) {
        if let Some(id) = id {
            record.tags.insert(scheme.id_tag.clone(), id);
            assigned += 1;
        }
    }
    debug!("stable ids assigned: {assigned} of {}", records.len());
    assigned
}

fn category_of<'a>(record: &'a PointRecord, scheme: &'a StableIdConfig) -> &'a str {
    record
        .tag(&scheme.category_tag)
        .unwrap_or(scheme.unknown_category.as_str())
}

fn compare_siblings(a: &PointRecord, b: &PointRecord, scheme: &StableIdConfig) -> Ordering {
    category_of(a, scheme)
        .cmp(category_of(b, scheme))
        .then_with(|| a.position.lat.total_cmp(&b.position.lat))
        .then_with(|| a.position.lon.total_cmp(&b.position.lon))
}
