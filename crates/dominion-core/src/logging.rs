//! Structured logging schema and field name constants for dominion.
//!
//! All crates use these names for structured `tracing` fields so log
//! aggregation can query import runs across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Run aborted (credential or feed failure), requires attention |
//! | WARN  | Activity failed, credential retried, commit reclassified duplicates |
//! | INFO  | Run start/finish, page commits, server lifecycle |
//! | DEBUG | Skip decisions, token refresh decisions, config choices |
//! | TRACE | Per-cell influence increments |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "engine", "db", "strava"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "aggregator", "orchestrator", "pool", "feed", "tokens"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "aggregate", "import", "commit", "refresh", "handle_event"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Internal user identifier.
pub const USER_ID: &str = "user_id";

/// Internal activity UUID.
pub const ACTIVITY_ID: &str = "activity_id";

/// Provider-assigned activity id (deduplication key).
pub const EXTERNAL_ID: &str = "external_id";

/// Provider athlete id (webhook owner).
pub const OWNER_ID: &str = "owner_id";

/// H3 cell identifier.
pub const CELL_ID: &str = "cell_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Feed page number being processed.
pub const PAGE: &str = "page";

/// Number of activities in a page.
pub const PAGE_LEN: &str = "page_len";

/// Number of distinct cells touched.
pub const CELL_COUNT: &str = "cell_count";

/// Number of raw samples decoded from a polyline.
pub const SAMPLE_COUNT: &str = "sample_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Skip reason ("duplicate", "no-geodata").
pub const SKIP_REASON: &str = "skip_reason";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
