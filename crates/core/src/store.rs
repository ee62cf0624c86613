//! Persistence boundary for collections, owned items, and wishlist items.

use std::collections::{HashMap, HashSet};
use std::ops::{Add, AddAssign};

use async_trait::async_trait;

use crate::collection::{Collection, NewCollection, OwnedItem, WishlistItem};
use crate::error::CoreError;
use crate::types::{DbId, EntityId};

/// Owned and wishlisted row counts directly under one parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemCounts {
    pub owned: i64,
    pub wishlist: i64,
}

impl ItemCounts {
    pub fn total(self) -> i64 {
        self.owned + self.wishlist
    }
}

impl Add for ItemCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            owned: self.owned + rhs.owned,
            wishlist: self.wishlist + rhs.wishlist,
        }
    }
}

impl AddAssign for ItemCounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Storage operations required by the collection-tree core.
///
/// Every batched method must be served by a single round-trip regardless of
/// how many ids it receives.
#[async_trait]
pub trait TreeStore: Send + Sync {
    async fn find_collection(&self, id: DbId) -> Result<Option<Collection>, CoreError>;

    async fn create_collection(&self, input: &NewCollection) -> Result<Collection, CoreError>;

    /// Overwrite the parent pointer. Validation is the caller's job.
    async fn set_parent(&self, id: DbId, parent_id: Option<DbId>) -> Result<(), CoreError>;

    /// Parent chain of `id`, nearest ancestor first, excluding `id`.
    ///
    /// The walk is never truncated by depth. If the chain loops, the first
    /// repeated id is the last element and the walk stops there.
    async fn ancestor_ids(&self, id: DbId) -> Result<Vec<DbId>, CoreError>;

    /// Transitive descendants of every root (roots themselves excluded),
    /// keyed by root. Roots without descendants may be absent.
    ///
    /// Depth is unbounded; no node is visited twice, so a corrupted cycle
    /// terminates.
    async fn descendant_ids(&self, roots: &[DbId]) -> Result<HashMap<DbId, Vec<DbId>>, CoreError>;

    /// Aggregate item counts for every given parent in one query. Parents
    /// without items may be absent.
    async fn item_counts_by_parent(
        &self,
        parent_ids: &[DbId],
    ) -> Result<HashMap<DbId, ItemCounts>, CoreError>;

    /// Newest-first owned items directly under `collection_id`.
    async fn recent_owned_items(
        &self,
        collection_id: DbId,
        limit: usize,
    ) -> Result<Vec<OwnedItem>, CoreError>;

    /// Newest-first wishlist items directly under `collection_id`.
    async fn recent_wishlist_items(
        &self,
        collection_id: DbId,
        limit: usize,
    ) -> Result<Vec<WishlistItem>, CoreError>;

    /// Newest-first direct sub-collections of `collection_id`.
    async fn recent_child_collections(
        &self,
        collection_id: DbId,
        limit: usize,
    ) -> Result<Vec<Collection>, CoreError>;

    /// Entity ids the user owns directly under `collection_id`.
    async fn owned_entity_ids_in(
        &self,
        user_id: DbId,
        collection_id: DbId,
    ) -> Result<HashSet<EntityId>, CoreError>;

    /// Entity ids the user has wishlisted directly under `collection_id`
    /// (`None` = root level).
    async fn wishlisted_entity_ids_in(
        &self,
        user_id: DbId,
        collection_id: Option<DbId>,
    ) -> Result<HashSet<EntityId>, CoreError>;

    /// Insert one wishlist row per entity id, silently skipping rows that
    /// already exist. Returns the number of rows actually inserted.
    async fn insert_wishlist_items(
        &self,
        user_id: DbId,
        entity_ids: &[EntityId],
        parent_collection_id: Option<DbId>,
    ) -> Result<u64, CoreError>;

    /// Which of `entity_ids` the user owns anywhere in their tree.
    async fn owned_entity_ids_among(
        &self,
        user_id: DbId,
        entity_ids: &[EntityId],
    ) -> Result<HashSet<EntityId>, CoreError>;

    /// Distinct catalog collection ids linked from any of the user's
    /// collections.
    async fn linked_catalog_ids(&self, user_id: DbId) -> Result<Vec<EntityId>, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_counts_add() {
        let mut total = ItemCounts { owned: 1, wishlist: 2 };
        total += ItemCounts { owned: 3, wishlist: 0 };
        assert_eq!(total, ItemCounts { owned: 4, wishlist: 2 });
        assert_eq!(total.total(), 6);
    }
}
