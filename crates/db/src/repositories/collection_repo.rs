//! Repository for the `collections` table, including the recursive tree
//! walks and the aggregate item count used by progress calculation.

use std::collections::HashMap;

use curio_core::collection::{NewCollection, UserImage};
use curio_core::store::ItemCounts;
use curio_core::types::{DbId, EntityId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::collection::CollectionRow;

/// Column list for collections queries.
const COLUMNS: &str = "id, user_id, parent_collection_id, name, description, \
    linked_dbot_collection_id, images, custom_image, created_at, updated_at";

pub struct CollectionRepo;

impl CollectionRepo {
    /// Insert a new collection, returning the created row.
    pub async fn create(pool: &PgPool, input: &NewCollection) -> Result<CollectionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO collections
                (user_id, parent_collection_id, name, description, linked_dbot_collection_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CollectionRow>(&query)
            .bind(input.user_id)
            .bind(input.parent_collection_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.linked_dbot_collection_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<CollectionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM collections WHERE id = $1");
        sqlx::query_as::<_, CollectionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Direct children of `parent_id` (root level when `None`), by name.
    pub async fn list_children(
        pool: &PgPool,
        user_id: DbId,
        parent_id: Option<DbId>,
    ) -> Result<Vec<CollectionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM collections
             WHERE user_id = $1 AND parent_collection_id IS NOT DISTINCT FROM $2
             ORDER BY name, id"
        );
        sqlx::query_as::<_, CollectionRow>(&query)
            .bind(user_id)
            .bind(parent_id)
            .fetch_all(pool)
            .await
    }

    /// Newest-first direct children of `parent_id`.
    pub async fn list_recent_children(
        pool: &PgPool,
        parent_id: DbId,
        limit: i64,
    ) -> Result<Vec<CollectionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM collections
             WHERE parent_collection_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2"
        );
        sqlx::query_as::<_, CollectionRow>(&query)
            .bind(parent_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Overwrite the parent pointer. Returns `true` if a row was updated.
    pub async fn set_parent(
        pool: &PgPool,
        id: DbId,
        parent_id: Option<DbId>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE collections SET parent_collection_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(parent_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the uploaded images and the deprecated custom image.
    pub async fn set_images(
        pool: &PgPool,
        id: DbId,
        images: &[UserImage],
        custom_image: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE collections SET images = $2, custom_image = $3, updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(Json(images))
        .bind(custom_image)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a collection; descendants and their items cascade.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM collections WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Ancestor ids of `id`, nearest first.
    ///
    /// The walk carries its path and stops at the first id already on it, so
    /// a corrupted cycle yields the repeated id as the last element instead
    /// of looping.
    pub async fn ancestor_ids(pool: &PgPool, id: DbId) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "WITH RECURSIVE chain (id, parent_id, depth, path, is_cycle) AS (
                SELECT id, parent_collection_id, 0, ARRAY[id], false
                FROM collections
                WHERE id = $1
                UNION ALL
                SELECT c.id, c.parent_collection_id, ch.depth + 1,
                       ch.path || c.id, c.id = ANY(ch.path)
                FROM collections c
                INNER JOIN chain ch ON c.id = ch.parent_id
                WHERE NOT ch.is_cycle
            )
            SELECT id FROM chain WHERE depth > 0 ORDER BY depth",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Transitive descendants of each root in one recursive query, keyed by
    /// root, shallowest first.
    ///
    /// Depth is unbounded; a node already on the current path is never
    /// revisited, so a corrupted cycle still terminates.
    pub async fn descendant_ids(
        pool: &PgPool,
        roots: &[DbId],
    ) -> Result<HashMap<DbId, Vec<DbId>>, sqlx::Error> {
        let rows: Vec<(DbId, DbId)> = sqlx::query_as(
            "WITH RECURSIVE tree (root_id, id, depth, path) AS (
                SELECT parent_collection_id, id, 1, ARRAY[parent_collection_id, id]
                FROM collections
                WHERE parent_collection_id = ANY($1)
                UNION ALL
                SELECT t.root_id, c.id, t.depth + 1, t.path || c.id
                FROM collections c
                INNER JOIN tree t ON c.parent_collection_id = t.id
                WHERE NOT c.id = ANY(t.path)
            )
            SELECT root_id, id FROM tree
            WHERE id <> root_id
            GROUP BY root_id, id
            ORDER BY root_id, MIN(depth), id",
        )
        .bind(roots)
        .fetch_all(pool)
        .await?;

        let mut descendants: HashMap<DbId, Vec<DbId>> = HashMap::new();
        for (root, id) in rows {
            descendants.entry(root).or_default().push(id);
        }
        Ok(descendants)
    }

    /// Owned and wishlisted row counts for every parent in `parent_ids`,
    /// computed by a single aggregate query.
    pub async fn item_counts_by_parent(
        pool: &PgPool,
        parent_ids: &[DbId],
    ) -> Result<HashMap<DbId, ItemCounts>, sqlx::Error> {
        let rows: Vec<(DbId, i64, i64)> = sqlx::query_as(
            "SELECT parent_collection_id,
                    SUM(owned)::BIGINT,
                    SUM(wishlist)::BIGINT
             FROM (
                SELECT parent_collection_id, COUNT(*) AS owned, 0::BIGINT AS wishlist
                FROM owned_items
                WHERE parent_collection_id = ANY($1)
                GROUP BY parent_collection_id
                UNION ALL
                SELECT parent_collection_id, 0::BIGINT, COUNT(*)
                FROM wishlist_items
                WHERE parent_collection_id = ANY($1)
                GROUP BY parent_collection_id
             ) counts
             GROUP BY parent_collection_id",
        )
        .bind(parent_ids)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(parent, owned, wishlist)| (parent, ItemCounts { owned, wishlist }))
            .collect())
    }

    /// Distinct catalog ids linked from any of the user's collections.
    pub async fn linked_catalog_ids(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<EntityId>, sqlx::Error> {
        let rows: Vec<(EntityId,)> = sqlx::query_as(
            "SELECT DISTINCT linked_dbot_collection_id
             FROM collections
             WHERE user_id = $1 AND linked_dbot_collection_id IS NOT NULL
             ORDER BY linked_dbot_collection_id",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
