//! HTTP client for the Database of Things (DBoT) catalog.
//!
//! [`DbotClient`] speaks the catalog's GraphQL endpoint and implements
//! [`curio_core::catalog::CatalogGateway`] so the core services never see
//! transport details.

pub mod client;
pub mod config;
pub mod error;
mod graphql;
pub mod normalize;

pub use client::DbotClient;
pub use config::CatalogConfig;
pub use error::CatalogError;
pub use normalize::ImageUrlNormalizer;
