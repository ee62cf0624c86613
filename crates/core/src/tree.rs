//! Structural validation for collection reparenting.

use std::collections::HashSet;

use crate::error::CoreError;
use crate::store::TreeStore;
use crate::types::DbId;

/// Keeps the parent relation a forest.
///
/// Moving through this guard is the only way parent pointers change, so the
/// acyclicity of every user's tree rests on [`TreeMutationGuard::validate_move`].
/// Trees may be arbitrarily deep; the ancestor walk is never truncated.
pub struct TreeMutationGuard<'a> {
    store: &'a dyn TreeStore,
}

impl<'a> TreeMutationGuard<'a> {
    pub fn new(store: &'a dyn TreeStore) -> Self {
        Self { store }
    }

    /// Check that `collection_id` may be placed under `new_parent_id`.
    ///
    /// Fails with [`CoreError::SelfParent`] for a self-move and
    /// [`CoreError::DescendantParent`] when the target lies in the
    /// collection's own subtree. Moving to the root always passes.
    pub async fn validate_move(
        &self,
        collection_id: DbId,
        new_parent_id: Option<DbId>,
    ) -> Result<(), CoreError> {
        let Some(parent_id) = new_parent_id else {
            return Ok(());
        };
        if parent_id == collection_id {
            return Err(CoreError::SelfParent);
        }

        let ancestors = self.store.ancestor_ids(parent_id).await?;
        let mut seen = HashSet::with_capacity(ancestors.len());
        for ancestor in ancestors {
            if ancestor == collection_id {
                return Err(CoreError::DescendantParent);
            }
            if ancestor == parent_id || !seen.insert(ancestor) {
                tracing::error!(collection_id, parent_id, ancestor, "Cycle in collection tree");
                return Err(CoreError::Internal(format!(
                    "Collection tree above {parent_id} contains a cycle at {ancestor}"
                )));
            }
        }
        Ok(())
    }
}
