//! [`TreeStore`] backed by PostgreSQL.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use curio_core::collection::{Collection, NewCollection, OwnedItem, WishlistItem};
use curio_core::error::CoreError;
use curio_core::store::{ItemCounts, TreeStore};
use curio_core::types::{DbId, EntityId};

use crate::repositories::{CollectionRepo, OwnedItemRepo, WishlistItemRepo};
use crate::DbPool;

pub struct PgTreeStore {
    pool: DbPool,
}

impl PgTreeStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Database failures are transient from the core's point of view.
fn store_error(err: sqlx::Error) -> CoreError {
    tracing::error!(error = %err, "Database query failed");
    CoreError::ExternalFetch(format!("database: {err}"))
}

fn limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl TreeStore for PgTreeStore {
    async fn find_collection(&self, id: DbId) -> Result<Option<Collection>, CoreError> {
        let row = CollectionRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_error)?;
        Ok(row.map(Collection::from))
    }

    async fn create_collection(&self, input: &NewCollection) -> Result<Collection, CoreError> {
        CollectionRepo::create(&self.pool, input)
            .await
            .map(Collection::from)
            .map_err(store_error)
    }

    async fn set_parent(&self, id: DbId, parent_id: Option<DbId>) -> Result<(), CoreError> {
        let updated = CollectionRepo::set_parent(&self.pool, id, parent_id)
            .await
            .map_err(store_error)?;
        if updated {
            Ok(())
        } else {
            Err(CoreError::not_found("collection", id))
        }
    }

    async fn ancestor_ids(&self, id: DbId) -> Result<Vec<DbId>, CoreError> {
        CollectionRepo::ancestor_ids(&self.pool, id)
            .await
            .map_err(store_error)
    }

    async fn descendant_ids(&self, roots: &[DbId]) -> Result<HashMap<DbId, Vec<DbId>>, CoreError> {
        if roots.is_empty() {
            return Ok(HashMap::new());
        }
        CollectionRepo::descendant_ids(&self.pool, roots)
            .await
            .map_err(store_error)
    }

    async fn item_counts_by_parent(
        &self,
        parent_ids: &[DbId],
    ) -> Result<HashMap<DbId, ItemCounts>, CoreError> {
        if parent_ids.is_empty() {
            return Ok(HashMap::new());
        }
        CollectionRepo::item_counts_by_parent(&self.pool, parent_ids)
            .await
            .map_err(store_error)
    }

    async fn recent_owned_items(
        &self,
        collection_id: DbId,
        max: usize,
    ) -> Result<Vec<OwnedItem>, CoreError> {
        let rows = OwnedItemRepo::list_recent_by_parent(&self.pool, collection_id, limit(max))
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(OwnedItem::from).collect())
    }

    async fn recent_wishlist_items(
        &self,
        collection_id: DbId,
        max: usize,
    ) -> Result<Vec<WishlistItem>, CoreError> {
        let rows = WishlistItemRepo::list_recent_by_parent(&self.pool, collection_id, limit(max))
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(WishlistItem::from).collect())
    }

    async fn recent_child_collections(
        &self,
        collection_id: DbId,
        max: usize,
    ) -> Result<Vec<Collection>, CoreError> {
        let rows = CollectionRepo::list_recent_children(&self.pool, collection_id, limit(max))
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(Collection::from).collect())
    }

    async fn owned_entity_ids_in(
        &self,
        user_id: DbId,
        collection_id: DbId,
    ) -> Result<HashSet<EntityId>, CoreError> {
        OwnedItemRepo::entity_ids_in(&self.pool, user_id, collection_id)
            .await
            .map_err(store_error)
    }

    async fn wishlisted_entity_ids_in(
        &self,
        user_id: DbId,
        collection_id: Option<DbId>,
    ) -> Result<HashSet<EntityId>, CoreError> {
        WishlistItemRepo::entity_ids_in(&self.pool, user_id, collection_id)
            .await
            .map_err(store_error)
    }

    async fn insert_wishlist_items(
        &self,
        user_id: DbId,
        entity_ids: &[EntityId],
        parent_collection_id: Option<DbId>,
    ) -> Result<u64, CoreError> {
        WishlistItemRepo::bulk_create(&self.pool, user_id, entity_ids, parent_collection_id)
            .await
            .map_err(store_error)
    }

    async fn owned_entity_ids_among(
        &self,
        user_id: DbId,
        entity_ids: &[EntityId],
    ) -> Result<HashSet<EntityId>, CoreError> {
        OwnedItemRepo::entity_ids_among(&self.pool, user_id, entity_ids)
            .await
            .map_err(store_error)
    }

    async fn linked_catalog_ids(&self, user_id: DbId) -> Result<Vec<EntityId>, CoreError> {
        CollectionRepo::linked_catalog_ids(&self.pool, user_id)
            .await
            .map_err(store_error)
    }
}
