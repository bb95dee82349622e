//! # dominion-core
//!
//! Core types, traits, and abstractions for the dominion territory engine.
//!
//! This crate provides the data model (activities, cells, influence,
//! credentials), the error taxonomy, the store and collaborator traits the
//! engine is written against, and the polyline → H3 cell indexer.

pub mod defaults;
pub mod error;
pub mod geo;
pub mod logging;
pub mod memory;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{CredentialError, DecodeError, Error, FeedError, Result};
pub use geo::{decode_path, visit_counts, GeoIndexer, H3Indexer};
pub use models::*;
pub use traits::*;
