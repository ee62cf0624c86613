//! Repository for the `wishlist_items` table.

use std::collections::HashSet;

use curio_core::types::{DbId, EntityId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::item::{CreateItem, ItemRow};

/// Column list for wishlist item queries.
const COLUMNS: &str = "id, user_id, entity_id, parent_collection_id, images, created_at";

pub struct WishlistItemRepo;

impl WishlistItemRepo {
    /// Insert a wishlist item. Returns `None` if the user already wishlisted
    /// the entity under the same parent.
    pub async fn create(pool: &PgPool, input: &CreateItem) -> Result<Option<ItemRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO wishlist_items (user_id, entity_id, parent_collection_id, images)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ItemRow>(&query)
            .bind(input.user_id)
            .bind(&input.entity_id)
            .bind(input.parent_collection_id)
            .bind(Json(&input.images))
            .fetch_optional(pool)
            .await
    }

    /// Insert one row per entity id under `parent_id` in a single statement,
    /// skipping rows that already exist. Returns the number inserted.
    pub async fn bulk_create(
        pool: &PgPool,
        user_id: DbId,
        entity_ids: &[EntityId],
        parent_id: Option<DbId>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO wishlist_items (user_id, entity_id, parent_collection_id)
             SELECT $1, entity_id, $3 FROM UNNEST($2::TEXT[]) AS input (entity_id)
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(entity_ids)
        .bind(parent_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Newest-first wishlist items directly under `parent_id`.
    pub async fn list_recent_by_parent(
        pool: &PgPool,
        parent_id: DbId,
        limit: i64,
    ) -> Result<Vec<ItemRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM wishlist_items
             WHERE parent_collection_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2"
        );
        sqlx::query_as::<_, ItemRow>(&query)
            .bind(parent_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// All wishlist rows of a user.
    pub async fn list_by_user(pool: &PgPool, user_id: DbId) -> Result<Vec<ItemRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM wishlist_items WHERE user_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, ItemRow>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Entity ids the user has wishlisted directly under `parent_id`
    /// (root level when `None`).
    pub async fn entity_ids_in(
        pool: &PgPool,
        user_id: DbId,
        parent_id: Option<DbId>,
    ) -> Result<HashSet<EntityId>, sqlx::Error> {
        let rows: Vec<(EntityId,)> = sqlx::query_as(
            "SELECT entity_id FROM wishlist_items
             WHERE user_id = $1 AND parent_collection_id IS NOT DISTINCT FROM $2",
        )
        .bind(user_id)
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
