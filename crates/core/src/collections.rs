//! Collection lifecycle operations: creation (optionally linked to a
//! catalog collection), reparenting, and deletion previews.

use serde::Serialize;

use crate::catalog::{CatalogGateway, ExternalEntity};
use crate::collection::{Collection, NewCollection};
use crate::entity_cache::EntityCache;
use crate::error::CoreError;
use crate::store::{ItemCounts, TreeStore};
use crate::tree::TreeMutationGuard;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum allowed length for a collection name.
pub const MAX_COLLECTION_NAME_LENGTH: usize = 255;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a collection name and return it trimmed.
pub fn validate_collection_name(name: &str) -> Result<String, CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Collection name must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_COLLECTION_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Collection name must not exceed {MAX_COLLECTION_NAME_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What deleting a collection would remove.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionPreview {
    pub collection_id: DbId,
    pub collection_name: String,
    /// Owned plus wishlisted rows in the collection and all descendants.
    pub total_items: i64,
    pub total_subcollections: i64,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct CollectionService<'a> {
    store: &'a dyn TreeStore,
    catalog: &'a dyn CatalogGateway,
}

impl<'a> CollectionService<'a> {
    pub fn new(store: &'a dyn TreeStore, catalog: &'a dyn CatalogGateway) -> Self {
        Self { store, catalog }
    }

    /// Load a collection, treating another user's collection as absent.
    pub async fn find_owned(&self, user_id: DbId, collection_id: DbId) -> Result<Collection, CoreError> {
        self.store
            .find_collection(collection_id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| CoreError::not_found("collection", collection_id))
    }

    /// Resolve a catalog collection that a user collection is about to be
    /// linked to.
    ///
    /// Any failure, including a catalog outage, is reported as
    /// `NotFound { entity: "dbot_collection" }`: a link must never be
    /// created to an unverified target.
    pub async fn validate_catalog_collection(
        &self,
        cache: &mut EntityCache,
        dbot_collection_id: &str,
    ) -> Result<ExternalEntity, CoreError> {
        if let Some(entity) = cache.get(dbot_collection_id).filter(|e| e.is_collection()) {
            return Ok(entity.clone());
        }
        match self.catalog.get_collection(dbot_collection_id).await {
            Ok(entity) => {
                cache.put(entity.clone());
                Ok(entity)
            }
            Err(err) => {
                tracing::warn!(
                    dbot_collection_id,
                    error = %err,
                    "Catalog collection could not be validated"
                );
                Err(CoreError::not_found("dbot_collection", dbot_collection_id))
            }
        }
    }

    /// Create a collection for `input.user_id`.
    ///
    /// The parent, when given, must belong to the same user. A catalog link,
    /// when given, must resolve to a catalog collection.
    pub async fn create_collection(
        &self,
        cache: &mut EntityCache,
        input: NewCollection,
    ) -> Result<Collection, CoreError> {
        let name = validate_collection_name(&input.name)?;
        if let Some(parent_id) = input.parent_collection_id {
            self.find_owned(input.user_id, parent_id).await?;
        }
        if let Some(linked) = input.linked_dbot_collection_id.as_deref() {
            self.validate_catalog_collection(cache, linked).await?;
        }

        let created = self
            .store
            .create_collection(&NewCollection { name, ..input })
            .await?;
        tracing::info!(
            user_id = created.user_id,
            collection_id = created.id,
            linked = ?created.linked_dbot_collection_id,
            "Collection created"
        );
        Ok(created)
    }

    /// Create a collection that tracks a catalog collection.
    pub async fn create_tracked_collection(
        &self,
        cache: &mut EntityCache,
        user_id: DbId,
        dbot_collection_id: &str,
        name: &str,
        parent_id: Option<DbId>,
    ) -> Result<Collection, CoreError> {
        self.create_collection(
            cache,
            NewCollection {
                user_id,
                name: name.to_string(),
                description: None,
                parent_collection_id: parent_id,
                linked_dbot_collection_id: Some(dbot_collection_id.to_string()),
            },
        )
        .await
    }

    /// Reparent a collection after ownership and structural validation.
    pub async fn move_collection(
        &self,
        user_id: DbId,
        collection_id: DbId,
        new_parent_id: Option<DbId>,
    ) -> Result<Collection, CoreError> {
        let mut collection = self.find_owned(user_id, collection_id).await?;
        if let Some(parent_id) = new_parent_id.filter(|p| *p != collection_id) {
            self.find_owned(user_id, parent_id).await?;
        }

        TreeMutationGuard::new(self.store)
            .validate_move(collection_id, new_parent_id)
            .await?;

        self.store.set_parent(collection_id, new_parent_id).await?;
        tracing::info!(user_id, collection_id, ?new_parent_id, "Collection moved");

        collection.parent_collection_id = new_parent_id;
        Ok(collection)
    }

    /// Count what a cascading delete of `collection_id` would remove.
    pub async fn deletion_preview(
        &self,
        user_id: DbId,
        collection_id: DbId,
    ) -> Result<DeletionPreview, CoreError> {
        let collection = self.find_owned(user_id, collection_id).await?;

        let descendants = self
            .store
            .descendant_ids(&[collection_id])
            .await?
            .remove(&collection_id)
            .unwrap_or_default();

        let mut nodes = descendants.clone();
        nodes.push(collection_id);
        let counts = self.store.item_counts_by_parent(&nodes).await?;
        let total: ItemCounts = nodes
            .iter()
            .filter_map(|id| counts.get(id).copied())
            .fold(ItemCounts::default(), |acc, c| acc + c);

        Ok(DeletionPreview {
            collection_id,
            collection_name: collection.name,
            total_items: total.total(),
            total_subcollections: descendants.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::testing::{catalog_collection, entity, InMemoryTreeStore, MockCatalog};

    const USER: DbId = 1;
    const OTHER_USER: DbId = 2;

    #[test]
    fn name_is_trimmed_and_required() {
        assert_eq!(validate_collection_name("  Base Set ").unwrap(), "Base Set");
        assert_matches!(validate_collection_name("   "), Err(CoreError::Validation(_)));
        let long = "x".repeat(MAX_COLLECTION_NAME_LENGTH + 1);
        assert_matches!(validate_collection_name(&long), Err(CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn tracked_collection_is_linked_and_cached() {
        let store = InMemoryTreeStore::new();
        let catalog = MockCatalog::new().with_entity(catalog_collection("dbot-1", None));
        let mut cache = EntityCache::new();

        let created = CollectionService::new(&store, &catalog)
            .create_tracked_collection(&mut cache, USER, "dbot-1", " Base Set ", None)
            .await
            .unwrap();

        assert_eq!(created.name, "Base Set");
        assert_eq!(created.linked_dbot_collection_id.as_deref(), Some("dbot-1"));
        assert!(cache.contains("dbot-1"));
    }

    #[tokio::test]
    async fn tracked_collection_requires_catalog_collection() {
        let store = InMemoryTreeStore::new();
        let catalog = MockCatalog::new().with_entity(entity("leaf", None));
        let service = CollectionService::new(&store, &catalog);
        let mut cache = EntityCache::new();

        assert_matches!(
            service
                .create_tracked_collection(&mut cache, USER, "leaf", "Leaf", None)
                .await,
            Err(CoreError::NotFound { entity: "dbot_collection", .. })
        );
        assert_matches!(
            service
                .create_tracked_collection(&mut cache, USER, "missing", "Missing", None)
                .await,
            Err(CoreError::NotFound { entity: "dbot_collection", .. })
        );
    }

    #[tokio::test]
    async fn catalog_outage_blocks_linked_creation() {
        let store = InMemoryTreeStore::new();
        let catalog = MockCatalog::new().failing();
        let result = CollectionService::new(&store, &catalog)
            .create_tracked_collection(&mut EntityCache::new(), USER, "dbot-1", "Set", None)
            .await;
        assert_matches!(result, Err(CoreError::NotFound { entity: "dbot_collection", .. }));
        assert!(store.collection(1).is_none());
    }

    #[tokio::test]
    async fn parent_must_belong_to_user() {
        let store = InMemoryTreeStore::new();
        let foreign = store.add_collection(OTHER_USER, "Theirs", None);
        let catalog = MockCatalog::new().with_entity(catalog_collection("dbot-1", None));

        let result = CollectionService::new(&store, &catalog)
            .create_tracked_collection(&mut EntityCache::new(), USER, "dbot-1", "Set", Some(foreign))
            .await;
        assert_matches!(result, Err(CoreError::NotFound { entity: "collection", .. }));
    }

    #[tokio::test]
    async fn move_updates_parent_after_validation() {
        let store = InMemoryTreeStore::new();
        let a = store.add_collection(USER, "A", None);
        let b = store.add_collection(USER, "B", None);
        let catalog = MockCatalog::new();
        let service = CollectionService::new(&store, &catalog);

        let moved = service.move_collection(USER, b, Some(a)).await.unwrap();
        assert_eq!(moved.parent_collection_id, Some(a));
        assert_eq!(store.collection(b).unwrap().parent_collection_id, Some(a));

        assert_matches!(
            service.move_collection(USER, a, Some(b)).await,
            Err(CoreError::DescendantParent)
        );
        assert_matches!(
            service.move_collection(USER, a, Some(a)).await,
            Err(CoreError::SelfParent)
        );
        assert_eq!(store.collection(a).unwrap().parent_collection_id, None);

        service.move_collection(USER, b, None).await.unwrap();
        assert_eq!(store.collection(b).unwrap().parent_collection_id, None);
    }

    #[tokio::test]
    async fn move_root_under_deep_descendant_leaves_tree_intact() {
        let store = InMemoryTreeStore::new();
        let root = store.add_collection(USER, "Level 0", None);
        let deepest = (1..=70).fold(root, |parent, level| {
            store.add_collection(USER, &format!("Level {level}"), Some(parent))
        });
        let catalog = MockCatalog::new();

        assert_matches!(
            CollectionService::new(&store, &catalog)
                .move_collection(USER, root, Some(deepest))
                .await,
            Err(CoreError::DescendantParent)
        );
        assert_eq!(store.collection(root).unwrap().parent_collection_id, None);
    }

    #[tokio::test]
    async fn move_rejects_foreign_collections() {
        let store = InMemoryTreeStore::new();
        let mine = store.add_collection(USER, "Mine", None);
        let theirs = store.add_collection(OTHER_USER, "Theirs", None);
        let catalog = MockCatalog::new();
        let service = CollectionService::new(&store, &catalog);

        assert_matches!(
            service.move_collection(USER, mine, Some(theirs)).await,
            Err(CoreError::NotFound { .. })
        );
        assert_matches!(
            service.move_collection(USER, theirs, None).await,
            Err(CoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn deletion_preview_counts_whole_subtree() {
        let store = InMemoryTreeStore::new();
        let root = store.add_collection(USER, "Root", None);
        let child = store.add_collection(USER, "Child", Some(root));
        let grandchild = store.add_collection(USER, "Grandchild", Some(child));
        store.add_owned(USER, "a", Some(root));
        store.add_wishlist(USER, "b", Some(child));
        store.add_owned(USER, "c", Some(grandchild));
        store.add_owned(USER, "d", None);
        let catalog = MockCatalog::new();

        let preview = CollectionService::new(&store, &catalog)
            .deletion_preview(USER, root)
            .await
            .unwrap();

        assert_eq!(
            preview,
            DeletionPreview {
                collection_id: root,
                collection_name: "Root".into(),
                total_items: 3,
                total_subcollections: 2,
            }
        );
        assert_eq!(store.item_count_queries(), 1);
    }
}
