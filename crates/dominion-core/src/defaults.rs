//! Centralized default constants for the dominion system.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// GEO INDEXING
// =============================================================================

/// H3 resolution used for every cell identifier (~0.1 km² hexagons, city scale).
///
/// Cell identifiers are resolution-dependent: changing this value orphans all
/// previously accumulated influence. It is passed to the indexer once at
/// construction and never varied per call.
pub const CELL_RESOLUTION: u8 = 9;

/// Decimal precision of encoded polylines (Google polyline algorithm, 1e5).
pub const POLYLINE_PRECISION: u32 = 5;

// =============================================================================
// IMPORT
// =============================================================================

/// Activities requested per feed page.
pub const IMPORT_PAGE_SIZE: u32 = 50;

/// Upper bound accepted for a configured page size (provider limit).
pub const IMPORT_PAGE_SIZE_MAX: u32 = 200;

/// Page number of the first feed page (the feed is 1-indexed).
pub const IMPORT_FIRST_PAGE: u32 = 1;

// =============================================================================
// CREDENTIALS
// =============================================================================

/// A token expiring within this many seconds is refreshed before use.
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

// =============================================================================
// STRAVA
// =============================================================================

/// Base URL of the Strava v3 REST API.
pub const STRAVA_API_BASE: &str = "https://www.strava.com/api/v3";

/// Strava OAuth token endpoint (refresh grant).
pub const STRAVA_OAUTH_URL: &str = "https://www.strava.com/oauth/token";

/// Timeout for a single Strava request (seconds).
pub const STRAVA_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// DATABASE
// =============================================================================

/// Ceiling of the PostgreSQL connection pool.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Seconds to wait for a pooled connection.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds an idle pooled connection is kept.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default HTTP bind address.
pub const SERVER_HOST: &str = "0.0.0.0";
