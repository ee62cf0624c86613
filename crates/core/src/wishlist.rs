//! Bulk wishlist import from catalog collections.
//!
//! [`WishlistBulkImporter::diff`] compares a catalog collection with what the
//! user already has in one target collection; [`WishlistBulkImporter::bulk_add`]
//! inserts wishlist rows without ever failing on duplicates. Both are
//! combined by [`WishlistBulkImporter::add_collection_to_wishlist`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogGateway, ExternalEntity};
use crate::collection::Collection;
use crate::collections::{validate_collection_name, CollectionService};
use crate::entity_cache::EntityCache;
use crate::error::CoreError;
use crate::store::TreeStore;
use crate::types::{DbId, EntityId};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Partition of a catalog collection against one target collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WishlistDiff {
    /// Entities in neither the owned nor the wishlist rows of the target,
    /// in catalog order.
    pub items_to_add: Vec<ExternalEntity>,
    pub already_owned_count: usize,
    pub already_wishlisted_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkAddResult {
    pub items_added: usize,
    pub items_skipped: usize,
}

/// How a catalog collection is added to the wishlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddCollectionMode {
    /// Create a new collection linked to the catalog collection and
    /// wishlist every member into it.
    Track,
    /// Wishlist the members missing from an existing collection.
    AddToExisting,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddCollectionRequest {
    pub mode: AddCollectionMode,
    pub dbot_collection_id: EntityId,
    /// Parent of the new collection in [`AddCollectionMode::Track`]; the
    /// collection to fill in [`AddCollectionMode::AddToExisting`].
    pub target_collection_id: Option<DbId>,
    /// Required in [`AddCollectionMode::Track`].
    pub new_collection_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddCollectionResult {
    pub created_collection: Option<Collection>,
    pub items_added: usize,
    pub items_already_owned: usize,
    pub items_skipped: usize,
}

// ---------------------------------------------------------------------------
// Importer
// ---------------------------------------------------------------------------

pub struct WishlistBulkImporter<'a> {
    store: &'a dyn TreeStore,
    catalog: &'a dyn CatalogGateway,
}

impl<'a> WishlistBulkImporter<'a> {
    pub fn new(store: &'a dyn TreeStore, catalog: &'a dyn CatalogGateway) -> Self {
        Self { store, catalog }
    }

    /// Split the catalog collection's members by their state in
    /// `target_collection_id`.
    ///
    /// Only rows directly under the target count; the same entity owned in
    /// another collection is still reported as to-add. An entity both owned
    /// and wishlisted in the target counts as owned.
    pub async fn diff(
        &self,
        external_collection_id: &str,
        target_collection_id: DbId,
        user_id: DbId,
    ) -> Result<WishlistDiff, CoreError> {
        let listing = self.catalog.get_collection_items(external_collection_id).await?;
        let owned = self
            .store
            .owned_entity_ids_in(user_id, target_collection_id)
            .await?;
        let wishlisted = self
            .store
            .wishlisted_entity_ids_in(user_id, Some(target_collection_id))
            .await?;

        let mut diff = WishlistDiff {
            items_to_add: Vec::new(),
            already_owned_count: 0,
            already_wishlisted_count: 0,
        };
        for item in listing.items {
            if owned.contains(&item.entity.id) {
                diff.already_owned_count += 1;
            } else if wishlisted.contains(&item.entity.id) {
                diff.already_wishlisted_count += 1;
            } else {
                diff.items_to_add.push(item.entity);
            }
        }
        Ok(diff)
    }

    /// Wishlist every id under `parent_collection_id`, skipping ids already
    /// wishlisted there and repeats within `entity_ids`.
    pub async fn bulk_add(
        &self,
        user_id: DbId,
        entity_ids: &[EntityId],
        parent_collection_id: Option<DbId>,
    ) -> Result<BulkAddResult, CoreError> {
        if let Some(position) = entity_ids.iter().position(|id| id.trim().is_empty()) {
            return Err(CoreError::Validation(format!(
                "Entity id at position {position} must not be empty"
            )));
        }
        if entity_ids.is_empty() {
            return Ok(BulkAddResult::default());
        }

        let existing = self
            .store
            .wishlisted_entity_ids_in(user_id, parent_collection_id)
            .await?;
        let mut seen: HashSet<&EntityId> = HashSet::with_capacity(entity_ids.len());
        let fresh: Vec<EntityId> = entity_ids
            .iter()
            .filter(|id| !existing.contains(*id) && seen.insert(*id))
            .cloned()
            .collect();

        let inserted = if fresh.is_empty() {
            0
        } else {
            self.store
                .insert_wishlist_items(user_id, &fresh, parent_collection_id)
                .await? as usize
        };

        let result = BulkAddResult {
            items_added: inserted,
            items_skipped: entity_ids.len() - inserted,
        };
        tracing::info!(
            user_id,
            ?parent_collection_id,
            added = result.items_added,
            skipped = result.items_skipped,
            "Bulk wishlist add"
        );
        Ok(result)
    }

    /// Add a whole catalog collection to the user's wishlist.
    pub async fn add_collection_to_wishlist(
        &self,
        cache: &mut EntityCache,
        user_id: DbId,
        request: AddCollectionRequest,
    ) -> Result<AddCollectionResult, CoreError> {
        match request.mode {
            AddCollectionMode::Track => self.track(cache, user_id, request).await,
            AddCollectionMode::AddToExisting => self.add_to_existing(cache, user_id, request).await,
        }
    }

    async fn track(
        &self,
        cache: &mut EntityCache,
        user_id: DbId,
        request: AddCollectionRequest,
    ) -> Result<AddCollectionResult, CoreError> {
        let name = request.new_collection_name.as_deref().unwrap_or_default();
        validate_collection_name(name).map_err(|_| {
            CoreError::Validation("new_collection_name is required for track mode".to_string())
        })?;

        let created = CollectionService::new(self.store, self.catalog)
            .create_tracked_collection(
                cache,
                user_id,
                &request.dbot_collection_id,
                name,
                request.target_collection_id,
            )
            .await?;

        let listing = self
            .catalog
            .get_collection_items(&request.dbot_collection_id)
            .await?;
        cache.put_collection_item_count(&request.dbot_collection_id, listing.len());
        let entity_ids: Vec<EntityId> = listing.entity_ids().cloned().collect();

        let added = self.bulk_add(user_id, &entity_ids, Some(created.id)).await?;
        Ok(AddCollectionResult {
            created_collection: Some(created),
            items_added: added.items_added,
            items_already_owned: 0,
            items_skipped: added.items_skipped,
        })
    }

    async fn add_to_existing(
        &self,
        cache: &mut EntityCache,
        user_id: DbId,
        request: AddCollectionRequest,
    ) -> Result<AddCollectionResult, CoreError> {
        let target_id = request.target_collection_id.ok_or_else(|| {
            CoreError::Validation("target_collection_id is required for add_to_existing mode".to_string())
        })?;

        let collections = CollectionService::new(self.store, self.catalog);
        collections
            .validate_catalog_collection(cache, &request.dbot_collection_id)
            .await?;
        collections.find_owned(user_id, target_id).await?;

        let diff = self
            .diff(&request.dbot_collection_id, target_id, user_id)
            .await?;
        let entity_ids: Vec<EntityId> = diff.items_to_add.iter().map(|e| e.id.clone()).collect();
        let added = self.bulk_add(user_id, &entity_ids, Some(target_id)).await?;

        Ok(AddCollectionResult {
            created_collection: None,
            items_added: added.items_added,
            items_already_owned: diff.already_owned_count,
            items_skipped: diff.already_wishlisted_count + added.items_skipped,
        })
    }
}
