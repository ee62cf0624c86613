//! Row struct for the `collections` table.

use curio_core::collection::{Collection, UserImage};
use curio_core::types::{DbId, EntityId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `collections` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CollectionRow {
    pub id: DbId,
    pub user_id: DbId,
    pub parent_collection_id: Option<DbId>,
    pub name: String,
    pub description: Option<String>,
    pub linked_dbot_collection_id: Option<EntityId>,
    pub images: Json<Vec<UserImage>>,
    pub custom_image: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<CollectionRow> for Collection {
    fn from(row: CollectionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            description: row.description,
            parent_collection_id: row.parent_collection_id,
            linked_dbot_collection_id: row.linked_dbot_collection_id,
            images: row.images.0,
            custom_image: row.custom_image,
            created_at: row.created_at,
        }
    }
}
