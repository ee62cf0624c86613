//! Collection-tree aggregation and representative-image engine.
//!
//! Pure domain logic: persistence and the external catalog are reached
//! through the [`store::TreeStore`] and [`catalog::CatalogGateway`] traits,
//! implemented in `curio-db` and `curio-catalog`.

pub mod catalog;
pub mod collection;
pub mod collections;
pub mod derived;
pub mod entity_cache;
pub mod error;
pub mod images;
pub mod listing;
pub mod progress;
pub mod store;
pub mod tree;
pub mod types;
pub mod wishlist;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
