//! Catalog connection settings.

use std::time::Duration;

/// Connection settings for the DBoT catalog.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base URL of the catalog, e.g. `https://dbot.example.com`.
    pub base_url: String,
    /// API key sent in the `apikey` header.
    pub api_key: String,
    /// Per-request timeout (default: 10 seconds).
    pub timeout: Duration,
    /// Substring replacements applied to every normalised image URL.
    pub image_url_transforms: Vec<(String, String)>,
}

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

impl CatalogConfig {
    /// Build a config with the default timeout and no URL transforms.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            image_url_transforms: Vec::new(),
        }
    }

    /// Load catalog configuration from environment variables.
    ///
    /// | Env Var                      | Required | Default |
    /// |------------------------------|----------|---------|
    /// | `DBOT_URL`                   | **yes**  | --      |
    /// | `DBOT_API_KEY`               | **yes**  | --      |
    /// | `DBOT_TIMEOUT_SECS`          | no       | `10`    |
    /// | `DBOT_IMAGE_URL_TRANSFORMS`  | no       | empty   |
    ///
    /// `DBOT_IMAGE_URL_TRANSFORMS` is a comma-separated list of `from=>to`
    /// pairs, see [`parse_transforms`].
    ///
    /// # Panics
    ///
    /// Panics if `DBOT_URL` or `DBOT_API_KEY` is missing or empty, or if
    /// `DBOT_TIMEOUT_SECS` is not a valid integer.
    pub fn from_env() -> Self {
        let base_url = std::env::var("DBOT_URL").expect("DBOT_URL must be set in the environment");
        assert!(!base_url.is_empty(), "DBOT_URL must not be empty");

        let api_key =
            std::env::var("DBOT_API_KEY").expect("DBOT_API_KEY must be set in the environment");
        assert!(!api_key.is_empty(), "DBOT_API_KEY must not be empty");

        let timeout_secs: u64 = std::env::var("DBOT_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .expect("DBOT_TIMEOUT_SECS must be a valid u64");

        let image_url_transforms = std::env::var("DBOT_IMAGE_URL_TRANSFORMS")
            .map(|raw| parse_transforms(&raw))
            .unwrap_or_default();

        Self {
            timeout: Duration::from_secs(timeout_secs),
            image_url_transforms,
            ..Self::new(base_url, api_key)
        }
    }
}

/// Parse `from=>to` pairs separated by commas.
///
/// Entries without `=>` or with an empty `from` side are ignored. The `to`
/// side may be empty, which deletes the matched substring.
pub fn parse_transforms(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (from, to) = pair.split_once("=>")?;
            let from = from.trim();
            if from.is_empty() {
                return None;
            }
            Some((from.to_string(), to.trim().to_string()))
        })
        .collect()
}
