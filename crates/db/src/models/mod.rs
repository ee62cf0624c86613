//! Row structs for the collection tree tables.
//!
//! Each row converts into the matching `curio_core` domain type; JSONB
//! image lists are decoded through [`sqlx::types::Json`].

pub mod collection;
pub mod item;
