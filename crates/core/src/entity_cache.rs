//! Operation-scoped memo of catalog entities.
//!
//! One [`EntityCache`] is created per logical operation (one response, one
//! CLI run) and passed explicitly to every component that needs catalog data.
//! The cache itself never performs I/O; [`EntityCache::resolve_one`] and
//! [`EntityCache::resolve_many`] take the gateway as an argument and
//! implement the cache-first protocol:
//!
//! 1. scan the cache,
//! 2. fetch the residual ids from the catalog in at most one call,
//! 3. backfill the cache before returning.
//!
//! Ids the catalog reported as absent are remembered for the rest of the
//! operation so they are not requested twice.

use std::collections::{HashMap, HashSet};

use crate::catalog::{CatalogGateway, ExternalEntity};
use crate::error::CoreError;
use crate::types::EntityId;

#[derive(Debug, Default)]
pub struct EntityCache {
    entities: HashMap<EntityId, ExternalEntity>,
    missing: HashSet<EntityId>,
    collection_item_counts: HashMap<EntityId, usize>,
    prefetched: bool,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ExternalEntity> {
        self.entities.get(id)
    }

    /// Cached entities for `ids`. Uncached ids are absent from the result.
    pub fn get_many(&self, ids: &[EntityId]) -> HashMap<EntityId, ExternalEntity> {
        ids.iter()
            .filter_map(|id| self.entities.get(id).map(|e| (id.clone(), e.clone())))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn put(&mut self, entity: ExternalEntity) {
        self.missing.remove(&entity.id);
        self.entities.insert(entity.id.clone(), entity);
    }

    pub fn put_many(&mut self, entities: impl IntoIterator<Item = ExternalEntity>) {
        for entity in entities {
            self.put(entity);
        }
    }

    /// Remember that the catalog does not know `id`.
    pub fn mark_missing(&mut self, id: &str) {
        if !self.entities.contains_key(id) {
            self.missing.insert(id.to_string());
        }
    }

    pub fn is_known_missing(&self, id: &str) -> bool {
        self.missing.contains(id)
    }

    pub fn put_collection_item_count(&mut self, collection_id: &str, count: usize) {
        self.collection_item_counts
            .insert(collection_id.to_string(), count);
    }

    /// Member count of a catalog collection, if a prefetch recorded one.
    pub fn collection_item_count(&self, collection_id: &str) -> Option<usize> {
        self.collection_item_counts.get(collection_id).copied()
    }

    pub fn mark_prefetched(&mut self) {
        self.prefetched = true;
    }

    pub fn is_prefetched(&self) -> bool {
        self.prefetched
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Look up one entity, fetching it from `gateway` on a cache miss.
    ///
    /// Returns `Ok(None)` when the catalog does not know the id.
    pub async fn resolve_one(
        &mut self,
        gateway: &dyn CatalogGateway,
        id: &str,
    ) -> Result<Option<ExternalEntity>, CoreError> {
        if let Some(entity) = self.entities.get(id) {
            return Ok(Some(entity.clone()));
        }
        if self.missing.contains(id) {
            return Ok(None);
        }

        match gateway.get_entity(id).await {
            Ok(entity) => {
                self.put(entity.clone());
                Ok(Some(entity))
            }
            Err(err) if err.is_not_found() => {
                self.mark_missing(id);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Look up many entities with at most one gateway call for the ids not
    /// already cached (none when everything is cached).
    ///
    /// The result contains only ids the catalog knows.
    pub async fn resolve_many(
        &mut self,
        gateway: &dyn CatalogGateway,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, ExternalEntity>, CoreError> {
        let mut found = HashMap::with_capacity(ids.len());
        let mut residual = Vec::new();
        let mut seen = HashSet::with_capacity(ids.len());

        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            if let Some(entity) = self.entities.get(id) {
                found.insert(id.clone(), entity.clone());
            } else if !self.missing.contains(id) {
                residual.push(id.clone());
            }
        }

        if residual.is_empty() {
            return Ok(found);
        }

        tracing::debug!(
            requested = ids.len(),
            residual = residual.len(),
            "Fetching uncached catalog entities"
        );
        let fetched = gateway.get_entities_by_ids(&residual).await?;

        for id in &residual {
            match fetched.get(id) {
                Some(entity) => {
                    found.insert(id.clone(), entity.clone());
                }
                None => self.mark_missing(id),
            }
        }
        self.put_many(fetched.into_values());

        Ok(found)
    }

    /// Mark every id that is neither cached nor known-missing as missing.
    ///
    /// Used after a failed batch fetch so later lookups in the same operation
    /// treat those ids as "no data" instead of retrying one by one.
    pub fn mark_unresolved_missing(&mut self, ids: &[EntityId]) {
        for id in ids {
            self.mark_missing(id);
        }
    }
}
