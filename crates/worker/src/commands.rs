//! Dispatch of one CLI command onto the core services.
//!
//! Every command gets a fresh [`EntityCache`], so catalog lookups are
//! shared within the command and never across commands.

use serde::Serialize;
use serde_json::{json, Value};

use curio_core::catalog::CatalogGateway;
use curio_core::collections::CollectionService;
use curio_core::derived::Derived;
use curio_core::entity_cache::EntityCache;
use curio_core::images::RepresentativeImageResolver;
use curio_core::listing::CollectionListing;
use curio_core::progress::ProgressAggregator;
use curio_core::store::TreeStore;
use curio_core::types::DbId;
use curio_core::wishlist::{AddCollectionRequest, WishlistBulkImporter};

use crate::cli::Command;

/// Run `command` for `user_id` and return its JSON report.
pub async fn run(
    command: Command,
    user_id: DbId,
    store: &dyn TreeStore,
    catalog: &dyn CatalogGateway,
) -> anyhow::Result<Value> {
    let mut cache = EntityCache::new();
    let collections = CollectionService::new(store, catalog);

    let report = match command {
        Command::Progress { collection } => {
            let collection = collections.find_owned(user_id, collection).await?;
            if collection.is_linked() {
                CollectionListing::new(store, catalog)
                    .prefetch_linked_collections(&mut cache, user_id)
                    .await;
            }
            let progress = ProgressAggregator::new(store)
                .progress_for_display(&collection, &cache)
                .await;
            json!({
                "collection_id": collection.id,
                "progress": derived_report(&progress)?,
            })
        }

        Command::Images { collections: ids } => {
            let mut loaded = Vec::with_capacity(ids.len());
            for id in ids {
                loaded.push(collections.find_owned(user_id, id).await?);
            }
            let mut resolved = RepresentativeImageResolver::new(store, catalog)
                .resolve_images_many(&loaded, &mut cache)
                .await;
            let mut entries = Vec::with_capacity(loaded.len());
            for collection in &loaded {
                let images = resolved
                    .remove(&collection.id)
                    .unwrap_or(Derived::Ok(Vec::new()));
                entries.push(json!({
                    "collection_id": collection.id,
                    "images": derived_report(&images)?,
                }));
            }
            Value::Array(entries)
        }

        Command::ImportCollection {
            dbot_collection,
            mode,
            target,
            name,
        } => {
            let request = AddCollectionRequest {
                mode: mode.into(),
                dbot_collection_id: dbot_collection,
                target_collection_id: target,
                new_collection_name: name,
            };
            let result = WishlistBulkImporter::new(store, catalog)
                .add_collection_to_wishlist(&mut cache, user_id, request)
                .await?;
            serde_json::to_value(result)?
        }

        Command::Move { collection, parent } => {
            let moved = collections.move_collection(user_id, collection, parent).await?;
            serde_json::to_value(moved)?
        }

        Command::DeletionPreview { collection } => {
            let preview = collections.deletion_preview(user_id, collection).await?;
            serde_json::to_value(preview)?
        }

        Command::Favorites { dbot_collections } => {
            let stats = CollectionListing::new(store, catalog)
                .favorite_collection_stats(&mut cache, user_id, &dbot_collections)
                .await?;
            serde_json::to_value(stats)?
        }
    };

    tracing::debug!(user_id, cached_entities = cache.len(), "Command finished");
    Ok(report)
}

/// `{ "value": ..., "degraded": bool, "error": ... }` for a display value.
fn derived_report<T: Serialize>(derived: &Derived<T>) -> serde_json::Result<Value> {
    Ok(json!({
        "value": serde_json::to_value(derived.value())?,
        "degraded": derived.is_degraded(),
        "error": derived.cause().map(ToString::to_string),
    }))
}

#[cfg(test)]
mod tests {
    use curio_core::error::CoreError;
    use curio_core::testing::{catalog_collection, entity, thumbnail, InMemoryTreeStore, MockCatalog};

    use super::*;
    use crate::cli::ImportMode;

    const USER: DbId = 1;

    #[tokio::test]
    async fn progress_reports_official_stats_for_linked_collection() {
        let store = InMemoryTreeStore::new();
        let root = store.add_collection(USER, "Base Set", None);
        store.update_collection(root, |c| c.linked_dbot_collection_id = Some("set-1".into()));
        store.add_owned(USER, "a", Some(root));
        store.add_wishlist(USER, "b", Some(root));
        let catalog = MockCatalog::new().with_collection(
            catalog_collection("set-1", None),
            vec![entity("a", None), entity("b", None), entity("c", None), entity("d", None)],
        );

        let report = run(Command::Progress { collection: root }, USER, &store, &catalog)
            .await
            .unwrap();

        assert_eq!(report["collection_id"], root);
        assert_eq!(report["progress"]["degraded"], false);
        assert_eq!(report["progress"]["value"]["owned_count"], 1);
        assert_eq!(report["progress"]["value"]["percentage"], 50.0);
        assert_eq!(report["progress"]["value"]["official_total_count"], 4);
    }

    #[tokio::test]
    async fn images_are_reported_in_input_order() {
        let store = InMemoryTreeStore::new();
        let first = store.add_collection(USER, "First", None);
        let second = store.add_collection(USER, "Second", None);
        store.add_owned_with_images(USER, "a", Some(second), vec![thumbnail("a.png")]);
        let catalog = MockCatalog::new();

        let report = run(
            Command::Images {
                collections: vec![second, first],
            },
            USER,
            &store,
            &catalog,
        )
        .await
        .unwrap();

        let entries = report.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["collection_id"], second);
        assert_eq!(entries[0]["images"]["value"].as_array().unwrap().len(), 1);
        assert_eq!(entries[1]["collection_id"], first);
        assert!(entries[1]["images"]["value"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn import_tracks_catalog_collection() {
        let store = InMemoryTreeStore::new();
        let catalog = MockCatalog::new().with_collection(
            catalog_collection("set-1", None),
            vec![entity("a", None), entity("b", None)],
        );

        let report = run(
            Command::ImportCollection {
                dbot_collection: "set-1".into(),
                mode: ImportMode::Track,
                target: None,
                name: Some("Base Set".into()),
            },
            USER,
            &store,
            &catalog,
        )
        .await
        .unwrap();

        assert_eq!(report["items_added"], 2);
        assert_eq!(report["created_collection"]["name"], "Base Set");
        assert_eq!(store.wishlist_rows(USER).len(), 2);
    }

    #[tokio::test]
    async fn move_into_descendant_is_an_error() {
        let store = InMemoryTreeStore::new();
        let parent = store.add_collection(USER, "Parent", None);
        let child = store.add_collection(USER, "Child", Some(parent));
        let catalog = MockCatalog::new();

        let err = run(
            Command::Move {
                collection: parent,
                parent: Some(child),
            },
            USER,
            &store,
            &catalog,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::DescendantParent)
        ));
    }

    #[tokio::test]
    async fn deletion_preview_is_serialised() {
        let store = InMemoryTreeStore::new();
        let root = store.add_collection(USER, "Root", None);
        store.add_collection(USER, "Child", Some(root));
        store.add_owned(USER, "a", Some(root));
        let catalog = MockCatalog::new();

        let report = run(Command::DeletionPreview { collection: root }, USER, &store, &catalog)
            .await
            .unwrap();

        assert_eq!(report["collection_name"], "Root");
        assert_eq!(report["total_items"], 1);
        assert_eq!(report["total_subcollections"], 1);
    }
}
