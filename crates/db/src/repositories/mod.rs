//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod collection_repo;
pub mod owned_item_repo;
pub mod wishlist_item_repo;

pub use collection_repo::CollectionRepo;
pub use owned_item_repo::OwnedItemRepo;
pub use wishlist_item_repo::WishlistItemRepo;
