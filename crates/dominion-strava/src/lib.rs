//! # dominion-strava
//!
//! Strava integration for the dominion territory engine.
//!
//! This crate provides:
//! - [`StravaClient`], the paginated activity feed (`ActivityFeed`)
//! - [`StravaTokenProvider`], OAuth refresh on top of any
//!   `CredentialRepository` (`TokenProvider`)
//!
//! # Example
//!
//! ```rust,no_run
//! use dominion_core::memory::InMemoryStore;
//! use dominion_strava::{StravaClient, StravaConfig, StravaTokenProvider};
//!
//! let config = StravaConfig::from_env();
//! let feed = StravaClient::new(config.clone()).unwrap();
//! let tokens = StravaTokenProvider::new(config, InMemoryStore::new()).unwrap();
//! ```

pub mod client;
pub mod config;
pub mod tokens;
pub mod types;

pub use client::StravaClient;
pub use config::StravaConfig;
pub use tokens::StravaTokenProvider;
