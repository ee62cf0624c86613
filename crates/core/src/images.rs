//! Representative images for collection cards.
//!
//! A collection is summarised by up to [`MAX_REPRESENTATIVE_IMAGES`] image
//! URLs chosen by an ordered list of strategies ([`ImageTier::ORDER`]). The
//! first tier that yields at least one image wins; tiers are never mixed.
//!
//! Catalog lookups always go through the caller's [`EntityCache`]. When many
//! collections are resolved together, [`RepresentativeImageResolver::resolve_images_many`]
//! gathers every catalog id any of them might need and warms the cache with a
//! single batched call before resolving, so resolution itself issues no
//! further catalog requests.

use std::collections::HashMap;

use crate::catalog::CatalogGateway;
use crate::collection::{first_storage_url, Collection, UserImage};
use crate::derived::Derived;
use crate::entity_cache::EntityCache;
use crate::error::CoreError;
use crate::store::TreeStore;
use crate::types::{DbId, EntityId};

/// Maximum number of images returned for one collection.
pub const MAX_REPRESENTATIVE_IMAGES: usize = 4;

// ---------------------------------------------------------------------------
// Strategy list
// ---------------------------------------------------------------------------

/// One source of representative images, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTier {
    /// The collection's own first uploaded image.
    UploadedImage,
    /// The deprecated `custom_image` URL.
    CustomImage,
    /// The linked catalog collection's image.
    LinkedCatalog,
    /// A mosaic built from items and sub-collections.
    Children,
}

impl ImageTier {
    pub const ORDER: [ImageTier; 4] = [
        ImageTier::UploadedImage,
        ImageTier::CustomImage,
        ImageTier::LinkedCatalog,
        ImageTier::Children,
    ];
}

/// An item's contribution to the mosaic: its own upload, or a catalog
/// entity whose image is looked up later.
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Url(String),
    Entity(EntityId),
}

impl Slot {
    fn for_item(images: &[UserImage], entity_id: &str) -> Self {
        match first_storage_url(images) {
            Some(url) => Slot::Url(url),
            None => Slot::Entity(entity_id.to_string()),
        }
    }
}

/// Store data needed by the [`ImageTier::Children`] tier.
#[derive(Debug, Clone, Default)]
struct ChildPlan {
    slots: Vec<Slot>,
    subcollections: Vec<Collection>,
}

impl ChildPlan {
    /// Catalog ids this plan may look up.
    fn catalog_ids(&self) -> impl Iterator<Item = &EntityId> {
        let slot_ids = self.slots.iter().filter_map(|slot| match slot {
            Slot::Entity(id) => Some(id),
            Slot::Url(_) => None,
        });
        let sub_ids = self
            .subcollections
            .iter()
            .filter(|sub| local_image(sub).is_none())
            .filter_map(|sub| sub.linked_dbot_collection_id.as_ref());
        slot_ids.chain(sub_ids)
    }
}

/// An image stored with the collection itself, without catalog access.
fn local_image(collection: &Collection) -> Option<String> {
    collection
        .uploaded_image_url()
        .or_else(|| collection.custom_image_url().map(String::from))
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct RepresentativeImageResolver<'a> {
    store: &'a dyn TreeStore,
    catalog: &'a dyn CatalogGateway,
}

impl<'a> RepresentativeImageResolver<'a> {
    pub fn new(store: &'a dyn TreeStore, catalog: &'a dyn CatalogGateway) -> Self {
        Self { store, catalog }
    }

    /// Up to four images for `collection`, newest content first.
    ///
    /// Catalog failures mean "no image from that source"; store failures
    /// degrade the whole result to an empty list.
    pub async fn resolve_images(
        &self,
        collection: &Collection,
        cache: &mut EntityCache,
    ) -> Derived<Vec<String>> {
        let result = self.resolve_with_plan(collection, cache, None).await;
        Derived::from_result("resolve_images", collection.id, result, Vec::new)
    }

    /// Resolve images for many collections with one batched catalog fetch
    /// for every uncached id they need combined.
    pub async fn resolve_images_many(
        &self,
        collections: &[Collection],
        cache: &mut EntityCache,
    ) -> HashMap<DbId, Derived<Vec<String>>> {
        let mut plans: HashMap<DbId, Result<ChildPlan, CoreError>> = HashMap::new();
        let mut wanted: Vec<EntityId> = Vec::new();

        for collection in collections {
            if local_image(collection).is_some() || plans.contains_key(&collection.id) {
                continue;
            }
            if let Some(linked) = &collection.linked_dbot_collection_id {
                wanted.push(linked.clone());
            }
            let plan = self.plan_children(collection.id).await;
            if let Ok(plan) = &plan {
                wanted.extend(plan.catalog_ids().cloned());
            }
            plans.insert(collection.id, plan);
        }

        self.prefetch(cache, &wanted).await;

        let mut results = HashMap::with_capacity(collections.len());
        for collection in collections {
            let result = match plans.remove(&collection.id) {
                Some(Ok(plan)) => self.resolve_with_plan(collection, cache, Some(plan)).await,
                // Earlier tiers may still answer; the children tier
                // re-plans and surfaces the store error if reached.
                Some(Err(err)) => {
                    tracing::debug!(collection_id = collection.id, error = %err, "Children plan failed");
                    self.resolve_with_plan(collection, cache, None).await
                }
                None if results.contains_key(&collection.id) => continue,
                None => self.resolve_with_plan(collection, cache, None).await,
            };
            results.insert(
                collection.id,
                Derived::from_result("resolve_images", collection.id, result, Vec::new),
            );
        }
        results
    }

    /// Evaluate the tiers in order, building the children plan only if the
    /// [`ImageTier::Children`] tier is reached and none was supplied.
    async fn resolve_with_plan(
        &self,
        collection: &Collection,
        cache: &mut EntityCache,
        mut plan: Option<ChildPlan>,
    ) -> Result<Vec<String>, CoreError> {
        for tier in ImageTier::ORDER {
            let images: Vec<String> = match tier {
                ImageTier::UploadedImage => collection.uploaded_image_url().into_iter().collect(),
                ImageTier::CustomImage => collection
                    .custom_image_url()
                    .map(String::from)
                    .into_iter()
                    .collect(),
                ImageTier::LinkedCatalog => match &collection.linked_dbot_collection_id {
                    Some(linked) => self.catalog_image(cache, linked).await.into_iter().collect(),
                    None => Vec::new(),
                },
                ImageTier::Children => {
                    let plan = match plan.take() {
                        Some(plan) => plan,
                        None => self.plan_children(collection.id).await?,
                    };
                    self.assemble_children(plan, cache).await
                }
            };
            if !images.is_empty() {
                tracing::trace!(collection_id = collection.id, ?tier, count = images.len(), "Resolved images");
                return Ok(images);
            }
        }
        Ok(Vec::new())
    }

    /// Newest owned items, then newest wishlist items to fill the remaining
    /// slots, then the newest direct sub-collections.
    async fn plan_children(&self, collection_id: DbId) -> Result<ChildPlan, CoreError> {
        let mut slots: Vec<Slot> = self
            .store
            .recent_owned_items(collection_id, MAX_REPRESENTATIVE_IMAGES)
            .await?
            .iter()
            .map(|item| Slot::for_item(&item.images, &item.entity_id))
            .collect();

        let remaining = MAX_REPRESENTATIVE_IMAGES.saturating_sub(slots.len());
        if remaining > 0 {
            let wishlist = self
                .store
                .recent_wishlist_items(collection_id, remaining)
                .await?;
            slots.extend(
                wishlist
                    .iter()
                    .map(|item| Slot::for_item(&item.images, &item.entity_id)),
            );
        }
        slots.truncate(MAX_REPRESENTATIVE_IMAGES);

        let subcollections = self
            .store
            .recent_child_collections(collection_id, MAX_REPRESENTATIVE_IMAGES)
            .await?;

        Ok(ChildPlan {
            slots,
            subcollections,
        })
    }

    async fn assemble_children(&self, plan: ChildPlan, cache: &mut EntityCache) -> Vec<String> {
        let entity_ids: Vec<EntityId> = plan
            .slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Entity(id) => Some(id.clone()),
                Slot::Url(_) => None,
            })
            .collect();

        let entities = if entity_ids.is_empty() {
            HashMap::new()
        } else {
            match cache.resolve_many(self.catalog, &entity_ids).await {
                Ok(found) => found,
                Err(err) => {
                    tracing::warn!(error = %err, ids = ?entity_ids, "Item image lookup failed");
                    cache.mark_unresolved_missing(&entity_ids);
                    HashMap::new()
                }
            }
        };

        let mut images: Vec<String> = plan
            .slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Url(url) => Some(url),
                Slot::Entity(id) => entities
                    .get(&id)
                    .and_then(|e| e.preferred_image())
                    .map(String::from),
            })
            .take(MAX_REPRESENTATIVE_IMAGES)
            .collect();

        let open = MAX_REPRESENTATIVE_IMAGES.saturating_sub(images.len());
        for sub in plan.subcollections.iter().take(open) {
            let image = match local_image(sub) {
                Some(url) => Some(url),
                None => match &sub.linked_dbot_collection_id {
                    Some(linked) => self.catalog_image(cache, linked).await,
                    None => None,
                },
            };
            images.extend(image);
        }

        images.truncate(MAX_REPRESENTATIVE_IMAGES);
        images
    }

    /// Preferred image of one catalog entity, cache first.
    async fn catalog_image(&self, cache: &mut EntityCache, id: &str) -> Option<String> {
        match cache.resolve_one(self.catalog, id).await {
            Ok(entity) => entity.and_then(|e| e.preferred_image().map(String::from)),
            Err(err) => {
                tracing::warn!(dbot_id = id, error = %err, "Catalog image lookup failed");
                cache.mark_missing(id);
                None
            }
        }
    }

    async fn prefetch(&self, cache: &mut EntityCache, ids: &[EntityId]) {
        if ids.is_empty() {
            return;
        }
        if let Err(err) = cache.resolve_many(self.catalog, ids).await {
            tracing::warn!(error = %err, count = ids.len(), "Batched image prefetch failed");
            cache.mark_unresolved_missing(ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{catalog_collection, entity, thumbnail, InMemoryTreeStore, MockCatalog};

    const USER: DbId = 1;

    fn img(id: &str) -> String {
        format!("https://img.example/{id}.png")
    }

    fn catalog_with(ids: &[&str]) -> MockCatalog {
        ids.iter().fold(MockCatalog::new(), |catalog, id| {
            catalog.with_entity(entity(id, Some(&img(id))))
        })
    }

    #[tokio::test]
    async fn uploaded_image_wins_over_everything() {
        let store = InMemoryTreeStore::new();
        let c = store.add_collection(USER, "Cards", None);
        store.update_collection(c, |c| {
            c.images = vec![UserImage {
                thumbnail: Some("thumbs/c.jpg".into()),
                original: Some("originals/c.jpg".into()),
            }];
            c.custom_image = Some("https://custom".into());
            c.linked_dbot_collection_id = Some("dbot-1".into());
        });
        store.add_owned(USER, "a", Some(c));
        let catalog = catalog_with(&["a"]);

        let images = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images(&store.collection(c).unwrap(), &mut EntityCache::new())
            .await
            .into_value();

        assert_eq!(images, vec!["/storage/thumbs/c.jpg".to_string()]);
        assert_eq!(catalog.total_calls(), 0);
    }

    #[tokio::test]
    async fn custom_image_returned_verbatim() {
        let store = InMemoryTreeStore::new();
        let c = store.add_collection(USER, "Cards", None);
        store.update_collection(c, |c| c.custom_image = Some("https://cdn/custom.png".into()));
        let catalog = MockCatalog::new();

        let images = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images(&store.collection(c).unwrap(), &mut EntityCache::new())
            .await
            .into_value();
        assert_eq!(images, vec!["https://cdn/custom.png".to_string()]);
    }

    #[tokio::test]
    async fn linked_collection_uses_catalog_image_from_cache() {
        let store = InMemoryTreeStore::new();
        let c = store.add_collection(USER, "Base Set", None);
        store.update_collection(c, |c| c.linked_dbot_collection_id = Some("dbot-1".into()));
        let catalog = MockCatalog::new();
        let mut cache = EntityCache::new();
        cache.put(catalog_collection("dbot-1", Some("https://img/base")));

        let images = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images(&store.collection(c).unwrap(), &mut cache)
            .await
            .into_value();

        assert_eq!(images, vec!["https://img/base".to_string()]);
        assert_eq!(catalog.total_calls(), 0);
    }

    #[tokio::test]
    async fn linked_collection_without_image_falls_through_to_children() {
        let store = InMemoryTreeStore::new();
        let c = store.add_collection(USER, "Base Set", None);
        store.update_collection(c, |c| c.linked_dbot_collection_id = Some("dbot-1".into()));
        store.add_owned(USER, "a", Some(c));
        let catalog = catalog_with(&["a"]).with_entity(catalog_collection("dbot-1", None));

        let images = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images(&store.collection(c).unwrap(), &mut EntityCache::new())
            .await
            .into_value();
        assert_eq!(images, vec![img("a")]);
    }

    #[tokio::test]
    async fn six_owned_items_yield_four_newest() {
        let store = InMemoryTreeStore::new();
        let c = store.add_collection(USER, "Cards", None);
        let ids = ["e1", "e2", "e3", "e4", "e5", "e6"];
        for id in ids {
            store.add_owned(USER, id, Some(c));
        }
        let catalog = catalog_with(&ids);

        let images = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images(&store.collection(c).unwrap(), &mut EntityCache::new())
            .await
            .into_value();

        assert_eq!(images, vec![img("e6"), img("e5"), img("e4"), img("e3")]);
        assert_eq!(catalog.batch_calls(), 1);
        assert_eq!(catalog.batch_requests()[0].len(), 4);
    }

    #[tokio::test]
    async fn wishlist_fills_remaining_slots_and_item_uploads_keep_position() {
        let store = InMemoryTreeStore::new();
        let c = store.add_collection(USER, "Cards", None);
        store.add_owned(USER, "o1", Some(c));
        store.add_owned_with_images(USER, "o2", Some(c), vec![thumbnail("items/o2.jpg")]);
        store.add_wishlist(USER, "w1", Some(c));
        store.add_wishlist(USER, "w2", Some(c));
        store.add_wishlist(USER, "w3", Some(c));
        let catalog = catalog_with(&["o1", "w1", "w2", "w3"]);

        let images = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images(&store.collection(c).unwrap(), &mut EntityCache::new())
            .await
            .into_value();

        assert_eq!(
            images,
            vec![
                "/storage/items/o2.jpg".to_string(),
                img("o1"),
                img("w3"),
                img("w2"),
            ]
        );
    }

    #[tokio::test]
    async fn subcollections_fill_gaps_and_imageless_ones_are_skipped() {
        let store = InMemoryTreeStore::new();
        let c = store.add_collection(USER, "Shelf", None);
        store.add_owned(USER, "a", Some(c));
        let linked = store.add_collection(USER, "Linked", Some(c));
        store.update_collection(linked, |s| s.linked_dbot_collection_id = Some("dbot-1".into()));
        let _empty = store.add_collection(USER, "Empty", Some(c));
        let custom = store.add_collection(USER, "Custom", Some(c));
        store.update_collection(custom, |s| s.custom_image = Some("https://custom".into()));
        let catalog = catalog_with(&["a"])
            .with_entity(catalog_collection("dbot-1", Some("https://img/dbot-1")));

        let images = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images(&store.collection(c).unwrap(), &mut EntityCache::new())
            .await
            .into_value();

        assert_eq!(
            images,
            vec![
                img("a"),
                "https://custom".to_string(),
                "https://img/dbot-1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn catalog_failure_is_not_a_degradation() {
        let store = InMemoryTreeStore::new();
        let c = store.add_collection(USER, "Cards", None);
        store.update_collection(c, |c| c.linked_dbot_collection_id = Some("dbot-1".into()));
        store.add_owned(USER, "a", Some(c));
        store.add_owned_with_images(USER, "b", Some(c), vec![thumbnail("items/b.jpg")]);
        let catalog = MockCatalog::new().failing();

        let derived = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images(&store.collection(c).unwrap(), &mut EntityCache::new())
            .await;

        assert!(!derived.is_degraded());
        assert_eq!(derived.into_value(), vec!["/storage/items/b.jpg".to_string()]);
    }

    #[tokio::test]
    async fn store_failure_degrades_to_empty() {
        let store = InMemoryTreeStore::new();
        let c = store.add_collection(USER, "Cards", None);
        let collection = store.collection(c).unwrap();
        store.fail_all();
        let catalog = MockCatalog::new();

        let derived = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images(&collection, &mut EntityCache::new())
            .await;

        assert!(derived.is_degraded());
        assert!(derived.value().is_empty());
    }

    #[tokio::test]
    async fn batch_store_failure_keeps_linked_catalog_image() {
        let store = InMemoryTreeStore::new();
        let linked = store.add_collection(USER, "Base Set", None);
        store.update_collection(linked, |c| c.linked_dbot_collection_id = Some("dbot-1".into()));
        let plain = store.add_collection(USER, "Loose", None);
        let collections = vec![store.collection(linked).unwrap(), store.collection(plain).unwrap()];
        store.fail_all();
        let catalog = MockCatalog::new();
        let mut cache = EntityCache::new();
        cache.put(catalog_collection("dbot-1", Some("https://img/base")));

        let results = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images_many(&collections, &mut cache)
            .await;

        assert!(!results[&linked].is_degraded());
        assert_eq!(results[&linked].value(), &vec!["https://img/base".to_string()]);
        assert!(results[&plain].is_degraded());
        assert!(results[&plain].value().is_empty());
        assert_eq!(catalog.total_calls(), 0);
    }

    #[tokio::test]
    async fn batch_resolution_issues_one_catalog_fetch() {
        let store = InMemoryTreeStore::new();
        let mut catalog = MockCatalog::new();
        let mut collections = Vec::new();
        for i in 0..5 {
            let c = store.add_collection(USER, &format!("C{i}"), None);
            for j in 0..2 {
                let id = format!("item-{i}-{j}");
                store.add_owned(USER, &id, Some(c));
                catalog = catalog.with_entity(entity(&id, Some(&img(&id))));
            }
            let sub = store.add_collection(USER, "Sub", Some(c));
            let dbot = format!("dbot-{i}");
            store.update_collection(sub, |s| s.linked_dbot_collection_id = Some(dbot.clone()));
            catalog = catalog.with_entity(catalog_collection(&dbot, Some(&img(&dbot))));
            collections.push(store.collection(c).unwrap());
        }

        let mut cache = EntityCache::new();
        let results = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images_many(&collections, &mut cache)
            .await;

        assert_eq!(results.len(), 5);
        for (i, c) in collections.iter().enumerate() {
            assert_eq!(
                results[&c.id].value(),
                &vec![img(&format!("item-{i}-1")), img(&format!("item-{i}-0")), img(&format!("dbot-{i}"))]
            );
        }
        assert_eq!(catalog.batch_calls(), 1);
        assert_eq!(catalog.get_entity_calls(), 0);
    }

    #[tokio::test]
    async fn batch_resolution_skips_fetch_when_everything_is_local() {
        let store = InMemoryTreeStore::new();
        let a = store.add_collection(USER, "A", None);
        store.update_collection(a, |c| c.custom_image = Some("https://a".into()));
        let catalog = MockCatalog::new();

        let results = RepresentativeImageResolver::new(&store, &catalog)
            .resolve_images_many(&[store.collection(a).unwrap()], &mut EntityCache::new())
            .await;

        assert_eq!(results[&a].value(), &vec!["https://a".to_string()]);
        assert_eq!(catalog.total_calls(), 0);
    }
}
