//! # dominion-engine
//!
//! Territory influence engine.
//!
//! This crate provides:
//! - [`InfluenceAggregator`]: one activity → staged per-cell increments
//! - [`WriteCache`]: batch-scoped read-through/write-back cache
//! - [`ImportOrchestrator`]: paged history imports and webhook events, one
//!   commit per page, one run per user at a time
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dominion_engine::{ImportOptions, ImportOrchestrator, InfluenceAggregator};
//!
//! let aggregator = InfluenceAggregator::new(activities, ledger, committer, indexer);
//! let orchestrator = ImportOrchestrator::new(aggregator, feed, tokens);
//!
//! let report = orchestrator.run(user_id, ImportOptions::from_env().recent()).await;
//! println!("imported {}", report.summary.imported);
//! ```

pub mod aggregator;
pub mod cache;
pub mod events;
pub mod locks;
pub mod orchestrator;

// Re-export core types
pub use dominion_core::*;

pub use aggregator::{InfluenceAggregator, ManualRecord};
pub use cache::WriteCache;
pub use events::{ChallengeResponse, EventOutcome, WebhookEvent, WebhookVerification};
pub use locks::UserLocks;
pub use orchestrator::{ImportOptions, ImportOrchestrator};
