//! In-memory test doubles for [`TreeStore`] and [`CatalogGateway`].
//!
//! Both doubles count their calls so tests can assert batching behaviour
//! (one aggregate count query, one catalog batch fetch) rather than just
//! results. Enabled for this crate's unit tests and, through the
//! `test-utils` feature, for downstream crates.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::DateTime;

use crate::catalog::{
    CatalogGateway, CollectionItem, CollectionItems, ExternalEntity, ENTITY_TYPE_COLLECTION,
};
use crate::collection::{Collection, NewCollection, OwnedItem, UserImage, WishlistItem};
use crate::error::CoreError;
use crate::store::{ItemCounts, TreeStore};
use crate::types::{DbId, EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A leaf catalog entity whose thumbnail is `image`.
pub fn entity(id: &str, image: Option<&str>) -> ExternalEntity {
    ExternalEntity {
        id: id.to_string(),
        name: format!("Entity {id}"),
        entity_type: "item".to_string(),
        year: None,
        image_url: None,
        thumbnail_url: image.map(String::from),
    }
}

/// A catalog collection entity.
pub fn catalog_collection(id: &str, image: Option<&str>) -> ExternalEntity {
    ExternalEntity {
        entity_type: ENTITY_TYPE_COLLECTION.to_string(),
        name: format!("Collection {id}"),
        ..entity(id, image)
    }
}

/// An uploaded image with only a thumbnail path.
pub fn thumbnail(path: &str) -> UserImage {
    UserImage {
        thumbnail: Some(path.to_string()),
        original: None,
    }
}

// ---------------------------------------------------------------------------
// InMemoryTreeStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    collections: Vec<Collection>,
    owned: Vec<OwnedItem>,
    wishlist: Vec<WishlistItem>,
    next_id: DbId,
}

impl StoreState {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    /// Creation time derived from the row id so "newest first" is
    /// deterministic.
    fn stamp(id: DbId) -> Timestamp {
        DateTime::from_timestamp(1_700_000_000 + id, 0).expect("valid fixture timestamp")
    }
}

/// A [`TreeStore`] backed by vectors behind a mutex.
#[derive(Default)]
pub struct InMemoryTreeStore {
    state: Mutex<StoreState>,
    failing: AtomicBool,
    item_count_queries: AtomicUsize,
    descendant_queries: AtomicUsize,
}

impl InMemoryTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store mutex poisoned")
    }

    fn check(&self) -> Result<(), CoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CoreError::ExternalFetch("store unavailable".into()))
        } else {
            Ok(())
        }
    }

    /// Make every subsequent call fail with [`CoreError::ExternalFetch`].
    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn item_count_queries(&self) -> usize {
        self.item_count_queries.load(Ordering::SeqCst)
    }

    pub fn descendant_queries(&self) -> usize {
        self.descendant_queries.load(Ordering::SeqCst)
    }

    pub fn add_collection(&self, user_id: DbId, name: &str, parent: Option<DbId>) -> DbId {
        let mut state = self.lock();
        let id = state.next_id();
        state.collections.push(Collection {
            id,
            user_id,
            name: name.to_string(),
            description: None,
            parent_collection_id: parent,
            linked_dbot_collection_id: None,
            images: Vec::new(),
            custom_image: None,
            created_at: StoreState::stamp(id),
        });
        id
    }

    /// Mutate a stored collection in place (images, links, or a raw parent
    /// pointer that bypasses move validation).
    pub fn update_collection(&self, id: DbId, f: impl FnOnce(&mut Collection)) {
        let mut state = self.lock();
        if let Some(collection) = state.collections.iter_mut().find(|c| c.id == id) {
            f(collection);
        }
    }

    pub fn collection(&self, id: DbId) -> Option<Collection> {
        self.lock().collections.iter().find(|c| c.id == id).cloned()
    }

    /// Add an owned item, removing any wishlist row for the same entity.
    pub fn add_owned(&self, user_id: DbId, entity_id: &str, parent: Option<DbId>) -> DbId {
        self.add_owned_with_images(user_id, entity_id, parent, Vec::new())
    }

    pub fn add_owned_with_images(
        &self,
        user_id: DbId,
        entity_id: &str,
        parent: Option<DbId>,
        images: Vec<UserImage>,
    ) -> DbId {
        let mut state = self.lock();
        let id = state.next_id();
        state
            .wishlist
            .retain(|w| !(w.user_id == user_id && w.entity_id == entity_id));
        state.owned.push(OwnedItem {
            id,
            user_id,
            entity_id: entity_id.to_string(),
            parent_collection_id: parent,
            images,
            created_at: StoreState::stamp(id),
        });
        id
    }

    pub fn add_wishlist(&self, user_id: DbId, entity_id: &str, parent: Option<DbId>) -> DbId {
        let mut state = self.lock();
        let id = state.next_id();
        state.wishlist.push(WishlistItem {
            id,
            user_id,
            entity_id: entity_id.to_string(),
            parent_collection_id: parent,
            images: Vec::new(),
            created_at: StoreState::stamp(id),
        });
        id
    }

    pub fn wishlist_rows(&self, user_id: DbId) -> Vec<WishlistItem> {
        self.lock()
            .wishlist
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect()
    }
}

fn newest_first<T: Clone>(mut rows: Vec<T>, key: impl Fn(&T) -> (Timestamp, DbId)) -> Vec<T> {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}

#[async_trait]
impl TreeStore for InMemoryTreeStore {
    async fn find_collection(&self, id: DbId) -> Result<Option<Collection>, CoreError> {
        self.check()?;
        Ok(self.collection(id))
    }

    async fn create_collection(&self, input: &NewCollection) -> Result<Collection, CoreError> {
        self.check()?;
        let id = self.add_collection(input.user_id, &input.name, input.parent_collection_id);
        self.update_collection(id, |c| {
            c.description = input.description.clone();
            c.linked_dbot_collection_id = input.linked_dbot_collection_id.clone();
        });
        self.collection(id)
            .ok_or_else(|| CoreError::Internal("inserted collection vanished".into()))
    }

    async fn set_parent(&self, id: DbId, parent_id: Option<DbId>) -> Result<(), CoreError> {
        self.check()?;
        self.update_collection(id, |c| c.parent_collection_id = parent_id);
        Ok(())
    }

    async fn ancestor_ids(&self, id: DbId) -> Result<Vec<DbId>, CoreError> {
        self.check()?;
        let state = self.lock();
        let parent_of: HashMap<DbId, Option<DbId>> = state
            .collections
            .iter()
            .map(|c| (c.id, c.parent_collection_id))
            .collect();

        let mut chain = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut current = parent_of.get(&id).copied().flatten();
        while let Some(ancestor) = current {
            chain.push(ancestor);
            if !visited.insert(ancestor) {
                break;
            }
            current = parent_of.get(&ancestor).copied().flatten();
        }
        Ok(chain)
    }

    async fn descendant_ids(&self, roots: &[DbId]) -> Result<HashMap<DbId, Vec<DbId>>, CoreError> {
        self.check()?;
        self.descendant_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();

        let mut children: HashMap<DbId, Vec<DbId>> = HashMap::new();
        for c in &state.collections {
            if let Some(parent) = c.parent_collection_id {
                children.entry(parent).or_default().push(c.id);
            }
        }

        let mut result = HashMap::new();
        for &root in roots {
            let mut visited = HashSet::from([root]);
            let mut found = Vec::new();
            let mut queue = VecDeque::from([root]);
            while let Some(node) = queue.pop_front() {
                for &child in children.get(&node).into_iter().flatten() {
                    if visited.insert(child) {
                        found.push(child);
                        queue.push_back(child);
                    }
                }
            }
            if !found.is_empty() {
                result.insert(root, found);
            }
        }
        Ok(result)
    }

    async fn item_counts_by_parent(
        &self,
        parent_ids: &[DbId],
    ) -> Result<HashMap<DbId, ItemCounts>, CoreError> {
        self.check()?;
        self.item_count_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        let wanted: HashSet<DbId> = parent_ids.iter().copied().collect();

        let mut counts: HashMap<DbId, ItemCounts> = HashMap::new();
        for parent in state.owned.iter().filter_map(|o| o.parent_collection_id) {
            if wanted.contains(&parent) {
                counts.entry(parent).or_default().owned += 1;
            }
        }
        for parent in state.wishlist.iter().filter_map(|w| w.parent_collection_id) {
            if wanted.contains(&parent) {
                counts.entry(parent).or_default().wishlist += 1;
            }
        }
        Ok(counts)
    }

    async fn recent_owned_items(
        &self,
        collection_id: DbId,
        limit: usize,
    ) -> Result<Vec<OwnedItem>, CoreError> {
        self.check()?;
        let rows = self
            .lock()
            .owned
            .iter()
            .filter(|o| o.parent_collection_id == Some(collection_id))
            .cloned()
            .collect();
        let mut rows = newest_first(rows, |o: &OwnedItem| (o.created_at, o.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn recent_wishlist_items(
        &self,
        collection_id: DbId,
        limit: usize,
    ) -> Result<Vec<WishlistItem>, CoreError> {
        self.check()?;
        let rows = self
            .lock()
            .wishlist
            .iter()
            .filter(|w| w.parent_collection_id == Some(collection_id))
            .cloned()
            .collect();
        let mut rows = newest_first(rows, |w: &WishlistItem| (w.created_at, w.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn recent_child_collections(
        &self,
        collection_id: DbId,
        limit: usize,
    ) -> Result<Vec<Collection>, CoreError> {
        self.check()?;
        let rows = self
            .lock()
            .collections
            .iter()
            .filter(|c| c.parent_collection_id == Some(collection_id))
            .cloned()
            .collect();
        let mut rows = newest_first(rows, |c: &Collection| (c.created_at, c.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn owned_entity_ids_in(
        &self,
        user_id: DbId,
        collection_id: DbId,
    ) -> Result<HashSet<EntityId>, CoreError> {
        self.check()?;
        Ok(self
            .lock()
            .owned
            .iter()
            .filter(|o| o.user_id == user_id && o.parent_collection_id == Some(collection_id))
            .map(|o| o.entity_id.clone())
            .collect())
    }

    async fn wishlisted_entity_ids_in(
        &self,
        user_id: DbId,
        collection_id: Option<DbId>,
    ) -> Result<HashSet<EntityId>, CoreError> {
        self.check()?;
        Ok(self
            .lock()
            .wishlist
            .iter()
            .filter(|w| w.user_id == user_id && w.parent_collection_id == collection_id)
            .map(|w| w.entity_id.clone())
            .collect())
    }

    async fn insert_wishlist_items(
        &self,
        user_id: DbId,
        entity_ids: &[EntityId],
        parent_collection_id: Option<DbId>,
    ) -> Result<u64, CoreError> {
        self.check()?;
        let existing = self
            .wishlisted_entity_ids_in(user_id, parent_collection_id)
            .await?;
        let mut inserted = 0;
        let mut seen = HashSet::new();
        for entity_id in entity_ids {
            if existing.contains(entity_id) || !seen.insert(entity_id) {
                continue;
            }
            self.add_wishlist(user_id, entity_id, parent_collection_id);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn owned_entity_ids_among(
        &self,
        user_id: DbId,
        entity_ids: &[EntityId],
    ) -> Result<HashSet<EntityId>, CoreError> {
        self.check()?;
        let wanted: HashSet<&EntityId> = entity_ids.iter().collect();
        Ok(self
            .lock()
            .owned
            .iter()
            .filter(|o| o.user_id == user_id && wanted.contains(&o.entity_id))
            .map(|o| o.entity_id.clone())
            .collect())
    }

    async fn linked_catalog_ids(&self, user_id: DbId) -> Result<Vec<EntityId>, CoreError> {
        self.check()?;
        let mut ids: Vec<EntityId> = self
            .lock()
            .collections
            .iter()
            .filter(|c| c.user_id == user_id)
            .filter_map(|c| c.linked_dbot_collection_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// MockCatalog
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CallLog {
    get_entity: usize,
    batches: Vec<Vec<EntityId>>,
    get_collection: usize,
    collection_items: usize,
    multiple_items: usize,
}

/// A [`CatalogGateway`] serving fixed entities and collection listings.
#[derive(Default)]
pub struct MockCatalog {
    entities: HashMap<EntityId, ExternalEntity>,
    collection_items: HashMap<EntityId, CollectionItems>,
    failing: bool,
    calls: Mutex<CallLog>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: ExternalEntity) -> Self {
        self.entities.insert(entity.id.clone(), entity);
        self
    }

    /// Register a catalog collection and its members (in listing order).
    /// Members are registered as entities too.
    pub fn with_collection(mut self, collection: ExternalEntity, members: Vec<ExternalEntity>) -> Self {
        let items = members
            .iter()
            .enumerate()
            .map(|(order, entity)| CollectionItem {
                entity: entity.clone(),
                order: order as i64,
            })
            .collect();
        self.collection_items
            .insert(collection.id.clone(), CollectionItems { items });
        for member in members {
            self.entities.insert(member.id.clone(), member);
        }
        self.entities.insert(collection.id.clone(), collection);
        self
    }

    /// Make every call fail with [`CoreError::ExternalFetch`].
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn log(&self) -> MutexGuard<'_, CallLog> {
        self.calls.lock().expect("catalog mutex poisoned")
    }

    fn check(&self) -> Result<(), CoreError> {
        if self.failing {
            Err(CoreError::ExternalFetch("catalog unavailable".into()))
        } else {
            Ok(())
        }
    }

    pub fn get_entity_calls(&self) -> usize {
        self.log().get_entity
    }

    pub fn batch_calls(&self) -> usize {
        self.log().batches.len()
    }

    /// The id lists passed to each `get_entities_by_ids` call, in order.
    pub fn batch_requests(&self) -> Vec<Vec<EntityId>> {
        self.log().batches.clone()
    }

    pub fn get_collection_calls(&self) -> usize {
        self.log().get_collection
    }

    pub fn collection_items_calls(&self) -> usize {
        self.log().collection_items
    }

    pub fn multiple_items_calls(&self) -> usize {
        self.log().multiple_items
    }

    /// Total number of calls that would have crossed the network.
    pub fn total_calls(&self) -> usize {
        let log = self.log();
        log.get_entity
            + log.batches.len()
            + log.get_collection
            + log.collection_items
            + log.multiple_items
    }
}

#[async_trait]
impl CatalogGateway for MockCatalog {
    async fn get_entity(&self, id: &str) -> Result<ExternalEntity, CoreError> {
        self.log().get_entity += 1;
        self.check()?;
        self.entities
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("dbot_entity", id))
    }

    async fn get_entities_by_ids(
        &self,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, ExternalEntity>, CoreError> {
        self.log().batches.push(ids.to_vec());
        self.check()?;
        Ok(ids
            .iter()
            .filter_map(|id| self.entities.get(id).map(|e| (id.clone(), e.clone())))
            .collect())
    }

    async fn get_collection(&self, id: &str) -> Result<ExternalEntity, CoreError> {
        self.log().get_collection += 1;
        self.check()?;
        self.entities
            .get(id)
            .filter(|e| e.is_collection())
            .cloned()
            .ok_or_else(|| CoreError::not_found("dbot_collection", id))
    }

    async fn get_collection_items(&self, id: &str) -> Result<CollectionItems, CoreError> {
        self.log().collection_items += 1;
        self.check()?;
        Ok(self.collection_items.get(id).cloned().unwrap_or_default())
    }

    async fn get_multiple_collection_items(
        &self,
        ids: &[EntityId],
        limit_per_collection: usize,
    ) -> Result<HashMap<EntityId, CollectionItems>, CoreError> {
        self.log().multiple_items += 1;
        self.check()?;
        Ok(ids
            .iter()
            .map(|id| {
                let mut listing = self.collection_items.get(id).cloned().unwrap_or_default();
                listing.items.truncate(limit_per_collection);
                (id.clone(), listing)
            })
            .collect())
    }
}
