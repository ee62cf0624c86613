//! Image URL normalisation.
//!
//! The catalog stores a mix of absolute URLs and storage-relative paths.
//! Every URL leaving this crate is absolute and has the configured
//! substring transforms applied.

use curio_core::catalog::ExternalEntity;

#[derive(Debug, Clone)]
pub struct ImageUrlNormalizer {
    base_url: String,
    transforms: Vec<(String, String)>,
}

impl ImageUrlNormalizer {
    pub fn new(base_url: impl Into<String>, transforms: Vec<(String, String)>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transforms,
        }
    }

    /// Normalise one URL. Empty or missing input yields `None`.
    pub fn normalize(&self, url: Option<&str>) -> Option<String> {
        let url = url.map(str::trim).filter(|u| !u.is_empty())?;
        let absolute = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        };
        Some(
            self.transforms
                .iter()
                .fold(absolute, |acc, (from, to)| acc.replace(from.as_str(), to)),
        )
    }

    /// Normalise both image fields of an entity in place.
    pub fn normalize_entity(&self, mut entity: ExternalEntity) -> ExternalEntity {
        entity.image_url = self.normalize(entity.image_url.as_deref());
        entity.thumbnail_url = self.normalize(entity.thumbnail_url.as_deref());
        entity
    }
}
