//! Merge of a remote snapshot with the seed catalog.
//!
//! Remote records come first, so on an `id` collision the remote record
//! shadows the seed one. Output is de-duplicated by `id` and ordered by
//! `created_at` descending; ties keep merge order (the sort is stable).
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::HashSet;

use crate::model::ListingRecord;

/// Reconcile typed remote records with the seed set. Malformed records
/// (blank `id` or `title`) are dropped.
pub fn reconcile<I>(remote: I, seed: &[ListingRecord]) -> Vec<ListingRecord>
where
    I: IntoIterator<Item = ListingRecord>,
{
    let mut seen = HashSet::new();
    let mut merged: Vec<ListingRecord> = remote
        .into_iter()
        .chain(seed.iter().cloned())
        .filter(ListingRecord::is_well_formed)
        .filter(|rec| seen.insert(rec.id.clone()))
        .collect();
    merged.sort_by_key(|rec| Reverse(rec.created_at));
    merged
}

/// Reconcile a raw snapshot as delivered by the remote stream.
pub fn reconcile_snapshot(raw: &[Value], seed: &[ListingRecord]) -> Vec<ListingRecord> {
    reconcile(raw.iter().filter_map(ListingRecord::from_raw), seed)
}
