//! Repository for the `owned_items` table.

use std::collections::HashSet;

use curio_core::types::{DbId, EntityId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::item::{CreateItem, ItemRow};

/// Column list for owned item queries.
const COLUMNS: &str = "id, user_id, entity_id, parent_collection_id, images, created_at";

pub struct OwnedItemRepo;

impl OwnedItemRepo {
    /// Insert an owned item, returning the created row.
    ///
    /// Runs in a transaction that first removes every wishlist row for the
    /// same (user, entity), wherever it sits in the tree.
    pub async fn create(pool: &PgPool, input: &CreateItem) -> Result<ItemRow, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let removed = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND entity_id = $2")
            .bind(input.user_id)
            .bind(&input.entity_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let query = format!(
            "INSERT INTO owned_items (user_id, entity_id, parent_collection_id, images)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ItemRow>(&query)
            .bind(input.user_id)
            .bind(&input.entity_id)
            .bind(input.parent_collection_id)
            .bind(Json(&input.images))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        if removed > 0 {
            tracing::debug!(
                user_id = input.user_id,
                entity_id = %input.entity_id,
                removed,
                "Removed wishlist rows for newly owned entity"
            );
        }
        Ok(row)
    }

    /// Newest-first owned items directly under `parent_id`.
    pub async fn list_recent_by_parent(
        pool: &PgPool,
        parent_id: DbId,
        limit: i64,
    ) -> Result<Vec<ItemRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM owned_items
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

    /// Entity ids the user owns directly under `parent_id`.
    pub async fn entity_ids_in(
        pool: &PgPool,
        user_id: DbId,
        parent_id: DbId,
    ) -> Result<HashSet<EntityId>, sqlx::Error> {
        let rows: Vec<(EntityId,)> = sqlx::query_as(
            "SELECT DISTINCT entity_id FROM owned_items
             WHERE user_id = $1 AND parent_collection_id = $2",
        )
        .bind(user_id)
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Which of `entity_ids` the user owns anywhere.
    pub async fn entity_ids_among(
        pool: &PgPool,
        user_id: DbId,
        entity_ids: &[EntityId],
    ) -> Result<HashSet<EntityId>, sqlx::Error> {
        let rows: Vec<(EntityId,)> = sqlx::query_as(
            "SELECT DISTINCT entity_id FROM owned_items
             WHERE user_id = $1 AND entity_id = ANY($2)",
        )
        .bind(user_id)
        .bind(entity_ids)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
