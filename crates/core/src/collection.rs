//! User collection tree domain types.
//!
//! A user's collections form a forest through `parent_collection_id`. Owned
//! and wishlisted items hang off collections (or the root when the parent is
//! `None`) and reference catalog entities by [`EntityId`].

use serde::{Deserialize, Serialize};

use crate::types::{DbId, EntityId, Timestamp};

/// Path segment under which user uploads are served.
pub const STORAGE_PREFIX: &str = "/storage/";

// ---------------------------------------------------------------------------
// Uploaded images
// ---------------------------------------------------------------------------

/// A user-uploaded image, stored as a pair of relative storage paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserImage {
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub original: Option<String>,
}

impl UserImage {
    /// The thumbnail path if present, otherwise the original.
    pub fn preferred_path(&self) -> Option<&str> {
        non_blank(self.thumbnail.as_deref()).or_else(|| non_blank(self.original.as_deref()))
    }

    /// Public URL of the preferred path, rooted at [`STORAGE_PREFIX`].
    pub fn storage_url(&self) -> Option<String> {
        self.preferred_path()
            .map(|path| format!("{STORAGE_PREFIX}{}", path.trim_start_matches('/')))
    }
}

/// Storage URL of the first uploaded image, if any.
pub fn first_storage_url(images: &[UserImage]) -> Option<String> {
    images.first().and_then(UserImage::storage_url)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// A node in a user's collection forest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub id: DbId,
    pub user_id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub parent_collection_id: Option<DbId>,
    pub linked_dbot_collection_id: Option<EntityId>,
    pub images: Vec<UserImage>,
    /// Deprecated single image URL, kept for collections created before
    /// multi-image uploads existed.
    pub custom_image: Option<String>,
    pub created_at: Timestamp,
}

impl Collection {
    /// Storage URL of the collection's own first uploaded image.
    pub fn uploaded_image_url(&self) -> Option<String> {
        first_storage_url(&self.images)
    }

    /// The deprecated custom image, ignoring blank values.
    pub fn custom_image_url(&self) -> Option<&str> {
        non_blank(self.custom_image.as_deref())
    }

    pub fn is_linked(&self) -> bool {
        self.linked_dbot_collection_id.is_some()
    }
}

/// DTO for creating a collection.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCollection {
    pub user_id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub parent_collection_id: Option<DbId>,
    pub linked_dbot_collection_id: Option<EntityId>,
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// A catalog entity the user owns, placed under one collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnedItem {
    pub id: DbId,
    pub user_id: DbId,
    pub entity_id: EntityId,
    pub parent_collection_id: Option<DbId>,
    pub images: Vec<UserImage>,
    pub created_at: Timestamp,
}

/// A catalog entity the user wants but does not own yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WishlistItem {
    pub id: DbId,
    pub user_id: DbId,
    pub entity_id: EntityId,
    pub parent_collection_id: Option<DbId>,
    pub images: Vec<UserImage>,
    pub created_at: Timestamp,
}
