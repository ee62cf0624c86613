#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Cannot move collection into itself")]
    SelfParent,

    #[error("Cannot move collection into its own descendant")]
    DescendantParent,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("External fetch failed: {0}")]
    ExternalFetch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`] with any displayable id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns `true` for errors that represent a missing record rather than
    /// a failed lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
