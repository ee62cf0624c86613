//! Ownership / wishlist completion statistics for collections.
//!
//! Shallow progress counts rows directly under one collection. Deep progress
//! sums the shallow counts over the collection and all of its descendants and
//! computes the percentage once on the totals. Batched variants use one
//! descendant enumeration and one aggregate count query regardless of how
//! many collections are requested.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::collection::Collection;
use crate::derived::Derived;
use crate::entity_cache::EntityCache;
use crate::error::CoreError;
use crate::store::{ItemCounts, TreeStore};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Derived completion stats for one collection. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressStats {
    pub owned_count: i64,
    pub wishlist_count: i64,
    pub total_count: i64,
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub official_owned_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub official_total_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub official_percentage: Option<f64>,
}

impl ProgressStats {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: ItemCounts) -> Self {
        let total = counts.total();
        Self {
            owned_count: counts.owned,
            wishlist_count: counts.wishlist,
            total_count: total,
            percentage: percentage(counts.owned, total),
            ..Self::default()
        }
    }

    /// Attach stats relative to the linked catalog collection's size.
    pub fn with_official_total(mut self, official_total: i64) -> Self {
        let official_owned = self.owned_count.min(official_total);
        self.official_owned_count = Some(official_owned);
        self.official_total_count = Some(official_total);
        self.official_percentage = Some(percentage(official_owned, official_total));
        self
    }
}

/// `part / total * 100` rounded half-up to two decimals; `0` when `total`
/// is not positive.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let (part, total) = (i128::from(part), i128::from(total));
    let hundredths = (part * 20_000 + total) / (2 * total);
    hundredths as f64 / 100.0
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct ProgressAggregator<'a> {
    store: &'a dyn TreeStore,
}

impl<'a> ProgressAggregator<'a> {
    pub fn new(store: &'a dyn TreeStore) -> Self {
        Self { store }
    }

    /// Counts of rows whose parent is exactly `collection_id`.
    pub async fn calculate_simple_progress(
        &self,
        collection_id: DbId,
    ) -> Result<ProgressStats, CoreError> {
        let counts = self.store.item_counts_by_parent(&[collection_id]).await?;
        Ok(ProgressStats::from_counts(
            counts.get(&collection_id).copied().unwrap_or_default(),
        ))
    }

    /// Counts over `collection_id` and its whole subtree.
    pub async fn calculate_progress(&self, collection_id: DbId) -> Result<ProgressStats, CoreError> {
        let mut stats = self.calculate_progress_many(&[collection_id]).await?;
        Ok(stats.remove(&collection_id).unwrap_or_default())
    }

    /// Deep progress for every id in `collection_ids`.
    ///
    /// Issues exactly one descendant enumeration and one aggregate count
    /// query for the whole batch.
    pub async fn calculate_progress_many(
        &self,
        collection_ids: &[DbId],
    ) -> Result<HashMap<DbId, ProgressStats>, CoreError> {
        if collection_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut roots = collection_ids.to_vec();
        roots.sort_unstable();
        roots.dedup();

        let descendants = self.store.descendant_ids(&roots).await?;

        let mut nodes: HashSet<DbId> = roots.iter().copied().collect();
        for ids in descendants.values() {
            nodes.extend(ids.iter().copied());
        }
        let nodes: Vec<DbId> = nodes.into_iter().collect();
        let counts = self.store.item_counts_by_parent(&nodes).await?;

        let stats = roots
            .iter()
            .map(|&root| {
                let mut total = counts.get(&root).copied().unwrap_or_default();
                for id in descendants.get(&root).into_iter().flatten() {
                    if *id != root {
                        total += counts.get(id).copied().unwrap_or_default();
                    }
                }
                (root, ProgressStats::from_counts(total))
            })
            .collect();

        tracing::debug!(
            roots = roots.len(),
            nodes = nodes.len(),
            "Calculated collection progress"
        );
        Ok(stats)
    }

    /// Deep progress for display, with official stats when the linked
    /// catalog collection's size is known to `cache`.
    ///
    /// Never fails: store errors produce zeroed stats.
    pub async fn progress_for_display(
        &self,
        collection: &Collection,
        cache: &EntityCache,
    ) -> Derived<ProgressStats> {
        let result = self.calculate_progress(collection.id).await.map(|stats| {
            match official_total(collection, cache) {
                Some(total) => stats.with_official_total(total),
                None => stats,
            }
        });
        Derived::from_result("calculate_progress", collection.id, result, ProgressStats::zero)
    }
}

fn official_total(collection: &Collection, cache: &EntityCache) -> Option<i64> {
    let linked = collection.linked_dbot_collection_id.as_deref()?;
    cache
        .collection_item_count(linked)
        .and_then(|count| i64::try_from(count).ok())
}
