use crate::model::{PointRecord, ReconSummary, ReviewItem, ReviewReason};

/// Compute summary counters from the classified collections.
pub fn compute_summary(
    cadastre_records: usize,
    comparison_records: usize,
    unchanged: usize,
    added: &[PointRecord],
    updated: &[PointRecord],
    removed: &[PointRecord],
    review: &[ReviewItem],
) -> ReconSummary {
    let mut summary = ReconSummary {
        cadastre_records,
        comparison_records,
        added: added.len(),
        updated: updated.len(),
        removed: removed.len(),
        review: review.len(),
        unchanged,
        ..ReconSummary::default()
    };

    for item in review {
        match item.reason {
            ReviewReason::ChangedInTheMeantime => summary.changed_in_the_meantime += 1,
            ReviewReason::CloseToOtherTree => summary.close_to_other_tree += 1,
            ReviewReason::DuplicateStableId => summary.duplicate_stable_id += 1,
        }
    }

    summary
}
