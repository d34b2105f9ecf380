use std::collections::{BTreeMap, HashSet};

use log::{debug, info, warn};

use crate::config::ReconConfig;
use crate::conflict::{conflicting_changes, differs, effective_timestamp, has_no_conflicts, merge_tags};
use crate::error::ReconError;
use crate::evidence::compute_summary;
use crate::model::{PointRecord, ReconResult, ReviewItem, ReviewReason};
use crate::raster::LatLonRaster;
use crate::stable_id::assign_stable_ids;

/// Three-way matching and merge of a cadastre snapshot against the
/// comparison dataset.
pub struct Reconciler {
    config: ReconConfig,
}

/// Outcome for one cadastre record.
enum Decision {
    Unchanged,
    Added,
    /// Index into the comparison records that absorbed the cadastre record.
    Updated(usize),
    Review(ReviewReason),
}

impl Reconciler {
    pub fn new(config: ReconConfig) -> Result<Self, ReconError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    /// Classify every cadastre record and every previously matched
    /// comparison record.
    ///
    /// Both collections are consumed. Stable ids are written into the tags of
    /// both; comparison records that absorb a cadastre record get their tag
    /// map replaced by the merged map and are returned in `updated`. Positions
    /// of comparison records are never changed.
    ///
    /// `cadastre` must be a complete snapshot: every previously matched
    /// comparison record whose stable id is missing from it is classified as
    /// removed.
    pub fn run(
        &self,
        mut cadastre: Vec<PointRecord>,
        mut comparison: Vec<PointRecord>,
    ) -> Result<ReconResult, ReconError> {
        let scheme = &self.config.stable_id;
        assign_stable_ids(&mut cadastre, scheme);
        assign_stable_ids(&mut comparison, scheme);

        let cadastre_ids: HashSet<String> = cadastre
            .iter()
            .filter_map(|r| r.tag(&scheme.id_tag).map(str::to_owned))
            .collect();

        // Partition comparison records: previously matched (by stable id)
        // vs. everything else, which goes into the raster.
        let mut matched_before: BTreeMap<String, usize> = BTreeMap::new();
        let mut duplicates: Vec<usize> = Vec::new();
        let mut others = LatLonRaster::new(self.config.area.bbox(), self.config.thresholds.raster_cell_deg);

        for (idx, record) in comparison.iter().enumerate() {
            match record.tag(&scheme.id_tag) {
                Some(id) if matched_before.contains_key(id) => {
                    warn!("{} repeats stable id {id}, sending to review", record.label());
                    duplicates.push(idx);
                }
                Some(id) => {
                    matched_before.insert(id.to_owned(), idx);
                }
                None => others.insert(record.position, idx),
            }
        }
        info!(
            "{}: {} cadastre records, {} comparison records ({} previously matched, {} other)",
            self.config.name,
            cadastre.len(),
            comparison.len(),
            matched_before.len(),
            others.len()
        );

        let mut added = Vec::new();
        let mut updated_idx = Vec::new();
        let mut review = Vec::new();
        let mut unchanged = 0;
        let mut claimed: HashSet<usize> = HashSet::new();

        for idx in duplicates {
            review.push(ReviewItem {
                record: comparison[idx].clone(),
                reason: ReviewReason::DuplicateStableId,
            });
        }

        for record in cadastre.iter() {
            let existing = record
                .tag(&scheme.id_tag)
                .and_then(|id| matched_before.get(id).copied());

            let decision = match existing {
                Some(target) => self.decide_matched(record, &mut comparison[target], target)?,
                None => self.decide_unmatched(record, &mut comparison, &others, &mut claimed)?,
            };

            match decision {
                Decision::Unchanged => unchanged += 1,
                Decision::Added => added.push(record.clone()),
                Decision::Updated(target) => updated_idx.push(target),
                Decision::Review(reason) => review.push(ReviewItem {
                    record: record.clone(),
                    reason,
                }),
            }
        }

        // Previously matched records whose id vanished from the snapshot.
        let removed: Vec<PointRecord> = matched_before
            .iter()
            .filter(|(id, _)| !cadastre_ids.contains(*id))
            .map(|(_, &idx)| comparison[idx].clone())
            .collect();

        let updated: Vec<PointRecord> = updated_idx.into_iter().map(|idx| comparison[idx].clone()).collect();

        let summary = compute_summary(
            cadastre.len(),
            comparison.len(),
            unchanged,
            &added,
            &updated,
            &removed,
            &review,
        );
        info!(
            "{} added, {} updated, {} removed, {} for review, {} unchanged",
            summary.added, summary.updated, summary.removed, summary.review, summary.unchanged
        );

        Ok(ReconResult {
            added,
            updated,
            removed,
            review,
            summary,
        })
    }

    /// The cadastre record's stable id is already present in the comparison
    /// dataset. The existing position always stays as it is.
    fn decide_matched(
        &self,
        incoming: &PointRecord,
        existing: &mut PointRecord,
        target: usize,
    ) -> Result<Decision, ReconError> {
        if !differs(&existing.tags, &incoming.tags) {
            return Ok(Decision::Unchanged);
        }

        let merge = &self.config.merge;
        let conflicts = conflicting_changes(&existing.tags, &incoming.tags, &merge.exempt_tags);
        let existing_ts = effective_timestamp(existing, &merge.timestamp_tags)?;
        let incoming_ts = effective_timestamp(incoming, &merge.timestamp_tags)?;

        if existing_ts < incoming_ts || conflicts.is_empty() {
            debug!("{}: updating from cadastre ({} conflicting keys)", existing.label(), conflicts.len());
            existing.tags = merge_tags(&existing.tags, &incoming.tags);
            Ok(Decision::Updated(target))
        } else {
            debug!(
                "{}: edited since cadastre snapshot, conflicting keys: {:?}",
                existing.label(),
                conflicts.iter().map(|c| c.key.as_str()).collect::<Vec<_>>()
            );
            Ok(Decision::Review(ReviewReason::ChangedInTheMeantime))
        }
    }

    /// No comparison record carries this stable id yet: look for unmatched
    /// comparison records nearby.
    fn decide_unmatched(
        &self,
        incoming: &PointRecord,
        comparison: &mut [PointRecord],
        others: &LatLonRaster<usize>,
        claimed: &mut HashSet<usize>,
    ) -> Result<Decision, ReconError> {
        let t = &self.config.thresholds;
        let position = incoming.position;

        let nearby: Vec<(usize, f64)> = others
            .query(&position.enclosing_bbox(t.safe_distance_m))
            .map(|(p, &idx)| (idx, position.distance_to(&p)))
            .filter(|(_, d)| *d < t.safe_distance_m)
            .collect();

        let (candidate, distance) = match nearby.as_slice() {
            [] => return Ok(Decision::Added),
            [single] => *single,
            _ => {
                debug!("{}: {} trees within {} m", incoming.label(), nearby.len(), t.safe_distance_m);
                return Ok(Decision::Review(ReviewReason::CloseToOtherTree));
            }
        };

        // A record absorbs at most one cadastre record per run.
        if claimed.contains(&candidate) {
            return Ok(Decision::Review(ReviewReason::CloseToOtherTree));
        }

        let merge = &self.config.merge;
        let existing = &mut comparison[candidate];
        let incoming_ts = effective_timestamp(incoming, &merge.timestamp_tags)?;
        let existing_ts = effective_timestamp(existing, &merge.timestamp_tags)?;

        if distance <= t.merge_distance_m
            && incoming_ts > existing_ts
            && has_no_conflicts(&incoming.tags, &existing.tags)
        {
            debug!("{}: absorbing cadastre record at {distance:.2} m", existing.label());
            existing.tags = merge_tags(&existing.tags, &incoming.tags);
            claimed.insert(candidate);
            Ok(Decision::Updated(candidate))
        } else {
            debug!("{}: single tree at {distance:.2} m, not mergeable", incoming.label());
            Ok(Decision::Review(ReviewReason::CloseToOtherTree))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LatLon, Tags};

    const ID_TAG: &str = "ref:muenster:tree";

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn cadastre(street: &str, species: &str, lat: f64, lon: f64) -> PointRecord {
        PointRecord {
            id: None,
            version: 1,
            timestamp: "2025-03-01".into(),
            position: LatLon::new(lat, lon),
            tags: tags(&[
                ("natural", "tree"),
                ("de:strassenschluessel", street),
                ("species:de", species),
            ]),
        }
    }

    fn osm(id: i64, timestamp: &str, lat: f64, lon: f64, t: &[(&str, &str)]) -> PointRecord {
        PointRecord {
            id: Some(id),
            version: 2,
            timestamp: timestamp.into(),
            position: LatLon::new(lat, lon),
            tags: tags(t),
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(ReconConfig::default()).unwrap()
    }

    /// ~1 m north of the given latitude.
    fn north(lat: f64, meters: f64) -> f64 {
        lat + meters / 111_195.0
    }

    #[test]
    fn new_tree_without_neighbours_is_added() {
        let result = reconciler()
            .run(vec![cadastre("S1", "Linde", 51.95, 7.60)], vec![])
            .unwrap();
        assert_eq!(result.added.len(), 1);
        assert_eq!(result.added[0].tag(ID_TAG), Some("S1_Linde_0"));
        assert!(result.updated.is_empty());
        assert!(result.review.is_empty());
    }

    #[test]
    fn unchanged_match_is_a_noop() {
        let existing = osm(
            5,
            "2024-01-01T00:00:00Z",
            51.95001,
            7.60001,
            &[
                ("natural", "tree"),
                ("de:strassenschluessel", "S1"),
                ("species:de", "Linde"),
            ],
        );
        let result = reconciler()
            .run(vec![cadastre("S1", "Linde", 51.95, 7.60)], vec![existing])
            .unwrap();
        assert_eq!(result.summary.unchanged, 1);
        assert!(result.added.is_empty());
        assert!(result.updated.is_empty());
        assert!(result.removed.is_empty());
        assert!(result.review.is_empty());
    }

    #[test]
    fn matched_update_keeps_existing_position() {
        let existing = osm(
            5,
            "2024-01-01T00:00:00Z",
            51.96,
            7.61,
            &[("natural", "tree"), (ID_TAG, "S1_Ahorn_0"), ("species:de", "Ahorn")],
        );
        let result = reconciler()
            .run(vec![cadastre("S1", "Ahorn", 51.95, 7.60)], vec![existing])
            .unwrap();
        assert_eq!(result.updated.len(), 1);
        let u = &result.updated[0];
        assert_eq!(u.position, LatLon::new(51.96, 7.61));
        assert_eq!(u.tag("de:strassenschluessel"), Some("S1"));
    }

    #[test]
    fn single_close_candidate_absorbs_cadastre_record() {
        let existing = osm(9, "2020-01-01T00:00:00Z", north(51.95, 1.5), 7.60, &[("natural", "tree")]);
        let result = reconciler()
            .run(vec![cadastre("S1", "Linde", 51.95, 7.60)], vec![existing])
            .unwrap();
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.updated[0].id, Some(9));
        assert_eq!(result.updated[0].tag(ID_TAG), Some("S1_Linde_0"));
        assert_eq!(result.updated[0].tag("species:de"), Some("Linde"));
    }

    #[test]
    fn single_candidate_between_merge_and_safe_goes_to_review() {
        let existing = osm(9, "2020-01-01T00:00:00Z", north(51.95, 4.0), 7.60, &[("natural", "tree")]);
        let result = reconciler()
            .run(vec![cadastre("S1", "Linde", 51.95, 7.60)], vec![existing])
            .unwrap();
        assert_eq!(result.review.len(), 1);
        assert_eq!(result.review[0].reason, ReviewReason::CloseToOtherTree);
        assert_eq!(result.summary.close_to_other_tree, 1);
    }

    #[test]
    fn single_candidate_with_conflicting_species_goes_to_review() {
        let existing = osm(
            9,
            "2020-01-01T00:00:00Z",
            north(51.95, 1.0),
            7.60,
            &[("natural", "tree"), ("species:de", "Eiche")],
        );
        let result = reconciler()
            .run(vec![cadastre("S1", "Linde", 51.95, 7.60)], vec![existing])
            .unwrap();
        assert_eq!(result.review.len(), 1);
        assert!(result.updated.is_empty());
    }

    #[test]
    fn single_candidate_newer_than_cadastre_goes_to_review() {
        let existing = osm(9, "2025-06-01T00:00:00Z", north(51.95, 1.0), 7.60, &[("natural", "tree")]);
        let result = reconciler()
            .run(vec![cadastre("S1", "Linde", 51.95, 7.60)], vec![existing])
            .unwrap();
        assert_eq!(result.review.len(), 1);
    }

    #[test]
    fn single_candidate_with_equal_timestamp_goes_to_review() {
        // Absorbing needs the cadastre to be strictly newer.
        let existing = osm(9, "2025-03-01T00:00:00Z", north(51.95, 1.0), 7.60, &[("natural", "tree")]);
        let result = reconciler()
            .run(vec![cadastre("S1", "Linde", 51.95, 7.60)], vec![existing])
            .unwrap();
        assert!(result.updated.is_empty());
        assert_eq!(result.review.len(), 1);
        assert_eq!(result.review[0].reason, ReviewReason::CloseToOtherTree);
    }

    #[test]
    fn candidate_exactly_at_merge_distance_is_absorbed() {
        let incoming = cadastre("S1", "Linde", 51.95, 7.60);
        let existing = osm(9, "2020-01-01T00:00:00Z", north(51.95, 2.0), 7.60, &[("natural", "tree")]);
        let distance = incoming.position.distance_to(&existing.position);

        let mut config = ReconConfig::default();
        config.thresholds.merge_distance_m = distance;
        let result = Reconciler::new(config.clone())
            .unwrap()
            .run(vec![incoming.clone()], vec![existing.clone()])
            .unwrap();
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.updated[0].id, Some(9));

        config.thresholds.merge_distance_m = distance * (1.0 - 1e-9);
        let result = Reconciler::new(config)
            .unwrap()
            .run(vec![incoming], vec![existing])
            .unwrap();
        assert!(result.updated.is_empty());
        assert_eq!(result.review[0].reason, ReviewReason::CloseToOtherTree);
    }

    #[test]
    fn matched_conflict_with_equal_timestamps_goes_to_review() {
        let existing = osm(
            5,
            "2025-03-01T00:00:00Z",
            51.95,
            7.60,
            &[("natural", "tree"), (ID_TAG, "S1_Platane_0"), ("species:de", "Ahorn")],
        );
        let result = reconciler()
            .run(vec![cadastre("S1", "Platane", 51.95, 7.60)], vec![existing])
            .unwrap();
        assert!(result.updated.is_empty());
        assert_eq!(result.review.len(), 1);
        assert_eq!(result.review[0].reason, ReviewReason::ChangedInTheMeantime);
        assert_eq!(result.summary.changed_in_the_meantime, 1);
    }

    #[test]
    fn area_spanning_most_of_the_globe_runs() {
        let config = ReconConfig::from_toml(
            "[area]\nmin_lat = -60.0\nmax_lat = 70.0\nmin_lon = -170.0\nmax_lon = 170.0\n",
        )
        .unwrap();
        let existing = osm(9, "2020-01-01T00:00:00Z", north(51.95, 1.0), 7.60, &[("natural", "tree")]);
        let result = Reconciler::new(config)
            .unwrap()
            .run(
                vec![cadastre("S1", "Linde", 51.95, 7.60), cadastre("S2", "Linde", -33.86, 151.21)],
                vec![existing],
            )
            .unwrap();
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.added.len(), 1);
    }

    #[test]
    fn candidate_beyond_safe_distance_is_ignored() {
        let existing = osm(9, "2020-01-01T00:00:00Z", north(51.95, 7.0), 7.60, &[("natural", "tree")]);
        let result = reconciler()
            .run(vec![cadastre("S1", "Linde", 51.95, 7.60)], vec![existing])
            .unwrap();
        assert_eq!(result.added.len(), 1);
    }

    #[test]
    fn co_located_comparison_records_are_distinct_candidates() {
        let a = osm(1, "2020-01-01T00:00:00Z", north(51.95, 1.0), 7.60, &[("natural", "tree")]);
        let b = osm(2, "2020-01-01T00:00:00Z", north(51.95, 1.0), 7.60, &[("natural", "tree")]);
        let result = reconciler()
            .run(vec![cadastre("S1", "Linde", 51.95, 7.60)], vec![a, b])
            .unwrap();
        assert_eq!(result.review.len(), 1);
        assert_eq!(result.review[0].reason, ReviewReason::CloseToOtherTree);
    }

    #[test]
    fn candidate_absorbs_at_most_one_cadastre_record() {
        let existing = osm(9, "2020-01-01T00:00:00Z", 51.95, 7.60, &[("natural", "tree")]);
        let result = reconciler()
            .run(
                vec![
                    cadastre("S1", "Linde", north(51.95, -1.0), 7.60),
                    cadastre("S2", "Linde", north(51.95, 1.0), 7.60),
                ],
                vec![existing],
            )
            .unwrap();
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.review.len(), 1);
        assert_eq!(result.review[0].record.tag(ID_TAG), Some("S2_Linde_0"));
    }

    #[test]
    fn duplicate_stable_ids_go_to_review_and_are_never_removed() {
        let first = osm(1, "2020-01-01T00:00:00Z", 51.93, 7.60, &[("natural", "tree"), (ID_TAG, "X_Linde_0")]);
        let second = osm(2, "2020-01-01T00:00:00Z", 51.94, 7.60, &[("natural", "tree"), (ID_TAG, "X_Linde_0")]);
        let result = reconciler().run(vec![], vec![first, second]).unwrap();
        assert_eq!(result.removed.len(), 1);
        assert_eq!(result.removed[0].id, Some(1));
        assert_eq!(result.review.len(), 1);
        assert_eq!(result.review[0].record.id, Some(2));
        assert_eq!(result.review[0].reason, ReviewReason::DuplicateStableId);
    }

    #[test]
    fn unparseable_timestamp_aborts_run() {
        let existing = osm(
            5,
            "not a date",
            51.95,
            7.60,
            &[(ID_TAG, "S1_Ahorn_0"), ("species:de", "Platane")],
        );
        let err = reconciler()
            .run(vec![cadastre("S1", "Ahorn", 51.95, 7.60)], vec![existing])
            .unwrap_err();
        assert!(matches!(err, ReconError::TimestampParse { .. }));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = ReconConfig::default();
        config.thresholds.merge_distance_m = 10.0;
        assert!(Reconciler::new(config).is_err());
    }
}
