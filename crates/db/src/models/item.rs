//! Row structs and create DTOs for `owned_items` and `wishlist_items`.

use curio_core::collection::{OwnedItem, UserImage, WishlistItem};
use curio_core::types::{DbId, EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A row from `owned_items` or `wishlist_items`; both tables share a shape.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ItemRow {
    pub id: DbId,
    pub user_id: DbId,
    pub entity_id: EntityId,
    pub parent_collection_id: Option<DbId>,
    pub images: Json<Vec<UserImage>>,
    pub created_at: Timestamp,
}

impl From<ItemRow> for OwnedItem {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            entity_id: row.entity_id,
            parent_collection_id: row.parent_collection_id,
            images: row.images.0,
            created_at: row.created_at,
        }
    }
}

impl From<ItemRow> for WishlistItem {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            entity_id: row.entity_id,
            parent_collection_id: row.parent_collection_id,
            images: row.images.0,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// Input for creating an owned or wishlisted item.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateItem {
    pub user_id: DbId,
    pub entity_id: EntityId,
    pub parent_collection_id: Option<DbId>,
    #[serde(default)]
    pub images: Vec<UserImage>,
}
