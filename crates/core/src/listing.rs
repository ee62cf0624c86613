//! Multi-collection views: warming the cache for a user's whole tree and
//! completion stats for favourited catalog collections.

use std::collections::HashSet;

use serde::Serialize;

use crate::catalog::{CatalogGateway, ExternalEntity};
use crate::entity_cache::EntityCache;
use crate::error::CoreError;
use crate::progress::percentage;
use crate::store::TreeStore;
use crate::types::{DbId, EntityId};

/// Members fetched per catalog collection for listing views.
pub const LISTING_ITEM_LIMIT: usize = 1000;

/// Completion of one favourited catalog collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FavoriteCollectionStats {
    pub collection: ExternalEntity,
    pub total_items: usize,
    pub owned_items: usize,
    pub completion_percentage: f64,
}

pub struct CollectionListing<'a> {
    store: &'a dyn TreeStore,
    catalog: &'a dyn CatalogGateway,
}

impl<'a> CollectionListing<'a> {
    pub fn new(store: &'a dyn TreeStore, catalog: &'a dyn CatalogGateway) -> Self {
        Self { store, catalog }
    }

    /// Load every catalog collection linked anywhere in the user's tree,
    /// together with its members and member count, into `cache`.
    ///
    /// Runs at most once per cache. Failures are logged; later lookups fall
    /// back to fetching on demand.
    pub async fn prefetch_linked_collections(&self, cache: &mut EntityCache, user_id: DbId) {
        if cache.is_prefetched() {
            return;
        }
        cache.mark_prefetched();

        let linked = match self.store.linked_catalog_ids(user_id).await {
            Ok(ids) if ids.is_empty() => return,
            Ok(ids) => ids,
            Err(err) => {
                tracing::error!(user_id, error = %err, "Failed to list linked collections");
                return;
            }
        };

        if let Err(err) = cache.resolve_many(self.catalog, &linked).await {
            tracing::error!(user_id, error = %err, "Failed to prefetch linked collections");
        }

        match self
            .catalog
            .get_multiple_collection_items(&linked, LISTING_ITEM_LIMIT)
            .await
        {
            Ok(listings) => {
                for (id, listing) in listings {
                    cache.put_collection_item_count(&id, listing.len());
                    cache.put_many(listing.items.into_iter().map(|item| item.entity));
                }
            }
            Err(err) => {
                tracing::error!(user_id, error = %err, "Failed to prefetch linked collection items");
            }
        }

        tracing::debug!(user_id, linked = linked.len(), cached = cache.len(), "Prefetched catalog data");
    }

    /// Stats for each favourited catalog collection, in input order.
    ///
    /// Uses one entity batch, one parallel item fetch, and one ownership
    /// query regardless of how many collections are listed. Ids unknown to
    /// the catalog are skipped.
    pub async fn favorite_collection_stats(
        &self,
        cache: &mut EntityCache,
        user_id: DbId,
        catalog_ids: &[EntityId],
    ) -> Result<Vec<FavoriteCollectionStats>, CoreError> {
        if catalog_ids.is_empty() {
            return Ok(Vec::new());
        }

        let collections = cache.resolve_many(self.catalog, catalog_ids).await?;
        let mut listings = self
            .catalog
            .get_multiple_collection_items(catalog_ids, LISTING_ITEM_LIMIT)
            .await?;

        let member_ids: Vec<EntityId> = listings
            .values()
            .flat_map(|listing| listing.entity_ids().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let owned = if member_ids.is_empty() {
            HashSet::new()
        } else {
            self.store.owned_entity_ids_among(user_id, &member_ids).await?
        };

        let mut seen = HashSet::new();
        let mut stats = Vec::with_capacity(catalog_ids.len());
        for id in catalog_ids {
            if !seen.insert(id) {
                continue;
            }
            let Some(collection) = collections.get(id) else {
                continue;
            };
            let listing = listings.remove(id).unwrap_or_default();
            cache.put_collection_item_count(id, listing.len());

            let members: HashSet<&EntityId> = listing.entity_ids().collect();
            let owned_items = members.iter().filter(|m| owned.contains(**m)).count();
            let total_items = listing.len();

            stats.push(FavoriteCollectionStats {
                collection: collection.clone(),
                total_items,
                owned_items,
                completion_percentage: percentage(owned_items as i64, total_items as i64),
            });
        }
        Ok(stats)
    }
}
