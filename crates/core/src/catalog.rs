//! Database of Things (DBoT) catalog contract.
//!
//! The catalog is the only source of truth for external entities. Core logic
//! talks to it exclusively through [`CatalogGateway`]; the HTTP client lives
//! in `curio-catalog`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::EntityId;

/// Entity type value used by the catalog for collections.
pub const ENTITY_TYPE_COLLECTION: &str = "collection";

/// A read-only entity record fetched from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEntity {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl ExternalEntity {
    /// `thumbnail_url` when present, falling back to `image_url`.
    pub fn preferred_image(&self) -> Option<&str> {
        self.thumbnail_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.image_url.as_deref().filter(|u| !u.is_empty()))
    }

    pub fn is_collection(&self) -> bool {
        self.entity_type == ENTITY_TYPE_COLLECTION
    }
}

/// One member of a catalog collection, with its canonical position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub entity: ExternalEntity,
    pub order: i64,
}

/// The ordered member list of a catalog collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionItems {
    pub items: Vec<CollectionItem>,
}

impl CollectionItems {
    /// Build from unordered items, sorting by `order` (stable for ties).
    pub fn from_unsorted(mut items: Vec<CollectionItem>) -> Self {
        items.sort_by_key(|item| item.order);
        Self { items }
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.items.iter().map(|item| &item.entity.id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Request/response contract of the external catalog.
///
/// Implementations perform a single bounded attempt per call; retries and
/// timeouts are their own concern. "Not found" is reported as
/// [`CoreError::NotFound`], transport problems as [`CoreError::ExternalFetch`].
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Fetch one entity by id.
    async fn get_entity(&self, id: &str) -> Result<ExternalEntity, CoreError>;

    /// Fetch many entities in one call. Ids the catalog does not know are
    /// simply absent from the returned map.
    async fn get_entities_by_ids(
        &self,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, ExternalEntity>, CoreError>;

    /// Fetch an entity that must be a collection.
    async fn get_collection(&self, id: &str) -> Result<ExternalEntity, CoreError>;

    /// Fetch every member of a catalog collection, sorted by `order`.
    async fn get_collection_items(&self, id: &str) -> Result<CollectionItems, CoreError>;

    /// Batch form of [`get_collection_items`](Self::get_collection_items)
    /// for listing views, capped at `limit_per_collection` members each.
    async fn get_multiple_collection_items(
        &self,
        ids: &[EntityId],
        limit_per_collection: usize,
    ) -> Result<HashMap<EntityId, CollectionItems>, CoreError>;
}
