//! Import orchestration: paged history imports and single-activity events.
//!
//! A run walks the states
//!
//! ```text
//! RequestingCredential -> FetchingPage -> ProcessingPage -> FetchingPage ... -> Done | Failed
//! ```
//!
//! Pages are fetched strictly one after another and each page is committed
//! as one batch before the next is requested. Per-activity failures are
//! tallied and skipped; credential and feed failures end the run. Every run
//! yields an [`ImportReport`], failed ones included.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use dominion_core::defaults::{IMPORT_FIRST_PAGE, IMPORT_PAGE_SIZE, IMPORT_PAGE_SIZE_MAX};
use dominion_core::{
    ActivityFailure, ActivityFeed, AggregationOutcome, Credential, CredentialError, Error,
    FeedError, FeedItem, ImportReport, ImportStatus, ImportSummary, RawActivity, Result, SkipReason,
    TokenProvider,
};

use crate::aggregator::InfluenceAggregator;
use crate::cache::WriteCache;
use crate::events::{EventOutcome, WebhookEvent};
use crate::locks::UserLocks;

/// Paging limits of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Activities requested per page (1..=200).
    pub page_size: u32,
    /// Stop after this many pages; `None` walks until an empty page.
    pub max_pages: Option<u32>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            page_size: IMPORT_PAGE_SIZE,
            max_pages: None,
        }
    }
}

impl ImportOptions {
    /// Load from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `IMPORT_PAGE_SIZE` | `50` | Activities per feed page |
    /// | `IMPORT_MAX_PAGES` | (none) | Page cap for full-history imports |
    pub fn from_env() -> Self {
        let page_size = std::env::var("IMPORT_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(IMPORT_PAGE_SIZE);
        let max_pages = std::env::var("IMPORT_MAX_PAGES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|&n| n > 0);

        Self::default().with_page_size(page_size).with_max_pages(max_pages)
    }

    /// Only the most recent page.
    pub fn recent(self) -> Self {
        self.with_max_pages(Some(1))
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, IMPORT_PAGE_SIZE_MAX);
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    fn allows_page(&self, page: u32) -> bool {
        match self.max_pages {
            Some(max) => page.saturating_sub(IMPORT_FIRST_PAGE) < max,
            None => true,
        }
    }
}

enum RunState {
    RequestingCredential,
    FetchingPage { page: u32 },
    ProcessingPage { page: u32, items: Vec<FeedItem> },
    Done,
    Failed(Error),
}

/// Result of one page or event batch after commit.
#[derive(Default)]
struct BatchTally {
    summary: ImportSummary,
    failures: Vec<ActivityFailure>,
}

/// Drives the aggregator from the activity feed.
#[derive(Clone)]
pub struct ImportOrchestrator {
    aggregator: InfluenceAggregator,
    feed: Arc<dyn ActivityFeed>,
    tokens: Arc<dyn TokenProvider>,
    locks: UserLocks,
}

impl ImportOrchestrator {
    pub fn new(
        aggregator: InfluenceAggregator,
        feed: Arc<dyn ActivityFeed>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            aggregator,
            feed,
            tokens,
            locks: UserLocks::new(),
        }
    }

    pub fn aggregator(&self) -> &InfluenceAggregator {
        &self.aggregator
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    /// Import a user's history page by page.
    #[instrument(skip(self), fields(subsystem = "engine", component = "orchestrator"))]
    pub async fn run(&self, user_id: Uuid, options: ImportOptions) -> ImportReport {
        let _guard = self.locks.acquire(user_id).await;
        let start = Instant::now();

        let mut summary = ImportSummary::default();
        let mut failures = Vec::new();
        let mut credential: Option<Credential> = None;
        let mut refreshed_for_page = false;
        let mut state = RunState::RequestingCredential;

        let failure = loop {
            state = match state {
                RunState::RequestingCredential => {
                    match self.tokens.valid_credential(user_id).await {
                        Ok(c) => {
                            credential = Some(c);
                            RunState::FetchingPage {
                                page: IMPORT_FIRST_PAGE,
                            }
                        }
                        Err(e) => RunState::Failed(e.into()),
                    }
                }

                RunState::FetchingPage { page } => {
                    let Some(cred) = credential.as_ref() else {
                        break Some(Error::Internal("no credential in fetch state".into()));
                    };
                    if !options.allows_page(page) {
                        RunState::Done
                    } else {
                        match self.feed.list_page(cred, page, options.page_size).await {
                            Ok(items) if items.is_empty() => RunState::Done,
                            Ok(items) => {
                                refreshed_for_page = false;
                                RunState::ProcessingPage { page, items }
                            }
                            Err(e) if e.is_unauthorized() && !refreshed_for_page => {
                                refreshed_for_page = true;
                                warn!(
                                    subsystem = "engine",
                                    component = "orchestrator",
                                    user_id = %user_id,
                                    page,
                                    "Feed rejected credential, refreshing once"
                                );
                                match self.tokens.force_refresh(user_id).await {
                                    Ok(c) => {
                                        credential = Some(c);
                                        RunState::FetchingPage { page }
                                    }
                                    Err(e) => RunState::Failed(e.into()),
                                }
                            }
                            Err(e) if e.is_unauthorized() => {
                                RunState::Failed(rejected_after_refresh(e).into())
                            }
                            Err(e) => RunState::Failed(e.into()),
                        }
                    }
                }

                RunState::ProcessingPage { page, items } => {
                    match self.process_page(user_id, page, items).await {
                        Ok(tally) => {
                            summary.absorb(&tally.summary);
                            summary.pages += 1;
                            failures.extend(tally.failures);
                            RunState::FetchingPage { page: page + 1 }
                        }
                        Err(e) => RunState::Failed(e),
                    }
                }

                RunState::Done => break None,
                RunState::Failed(e) => break Some(e),
            };
        };

        let report = ImportReport {
            user_id,
            status: if failure.is_some() {
                ImportStatus::Failed
            } else {
                ImportStatus::Completed
            },
            summary,
            failures,
            error: failure.map(|e| e.to_string()),
        };

        if let Some(ref error) = report.error {
            warn!(
                subsystem = "engine",
                component = "orchestrator",
                op = "run",
                user_id = %user_id,
                pages = report.summary.pages,
                imported = report.summary.imported,
                error = %error,
                duration_ms = start.elapsed().as_millis() as u64,
                "Import run failed"
            );
        } else {
            info!(
                subsystem = "engine",
                component = "orchestrator",
                op = "run",
                user_id = %user_id,
                pages = report.summary.pages,
                imported = report.summary.imported,
                skipped_duplicate = report.summary.skipped_duplicate,
                skipped_no_geodata = report.summary.skipped_no_geodata,
                failed = report.summary.failed,
                duration_ms = start.elapsed().as_millis() as u64,
                "Import run completed"
            );
        }
        report
    }

    /// Aggregate and commit one page. Only run-level errors are returned.
    async fn process_page(
        &self,
        user_id: Uuid,
        page: u32,
        items: Vec<FeedItem>,
    ) -> Result<BatchTally> {
        let start = Instant::now();
        let mut cache = WriteCache::new();
        let mut tally = BatchTally::default();

        for item in &items {
            match item {
                FeedItem::Activity(raw) => {
                    self.aggregate_one(user_id, raw, &mut cache, &mut tally)
                        .await?
                }
                FeedItem::Malformed { external_id, error } => {
                    warn!(
                        subsystem = "engine",
                        component = "orchestrator",
                        user_id = %user_id,
                        page,
                        external_id = ?external_id,
                        error = %error,
                        "Skipping unreadable feed record"
                    );
                    tally.summary.total_seen += 1;
                    tally.summary.failed += 1;
                    tally.failures.push(ActivityFailure {
                        external_id: *external_id,
                        error: format!("malformed feed record: {}", error),
                    });
                }
            }
        }

        let receipt = self.aggregator.commit(&mut cache).await?;
        reclassify_lost_inserts(&mut tally.summary, receipt.duplicates.len());

        debug!(
            subsystem = "engine",
            component = "orchestrator",
            op = "page",
            user_id = %user_id,
            page,
            page_len = items.len(),
            imported = tally.summary.imported,
            failed = tally.summary.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Page committed"
        );
        Ok(tally)
    }

    /// Aggregate one feed item into `cache`, tallying its outcome.
    ///
    /// Decode failures are the item's own problem and are recorded; any other
    /// error is returned and ends the batch.
    async fn aggregate_one(
        &self,
        user_id: Uuid,
        raw: &RawActivity,
        cache: &mut WriteCache,
        tally: &mut BatchTally,
    ) -> Result<()> {
        tally.summary.total_seen += 1;
        match self
            .aggregator
            .aggregate(user_id, Some(raw.external_id), raw.usable_polyline(), cache)
            .await
        {
            Ok(AggregationOutcome::Imported { .. }) => tally.summary.imported += 1,
            Ok(AggregationOutcome::Skipped { reason }) => tally.summary.record_skip(reason),
            Err(Error::Decode(e)) => {
                warn!(
                    subsystem = "engine",
                    component = "orchestrator",
                    user_id = %user_id,
                    external_id = raw.external_id,
                    error = %e,
                    "Skipping activity with undecodable polyline"
                );
                tally.summary.failed += 1;
                tally.failures.push(ActivityFailure {
                    external_id: Some(raw.external_id),
                    error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Handle one webhook event. Always yields an acknowledgement.
    #[instrument(
        skip(self, event),
        fields(subsystem = "engine", component = "orchestrator", owner_id = event.owner_id)
    )]
    pub async fn handle_event(&self, event: WebhookEvent) -> EventOutcome {
        if !event.is_activity_create() {
            debug!(
                subsystem = "engine",
                component = "orchestrator",
                object_type = %event.object_type,
                aspect_type = %event.aspect_type,
                "Ignoring webhook event"
            );
            return EventOutcome::Ignored {
                object_type: event.object_type,
                aspect_type: event.aspect_type,
            };
        }

        let user_id = match self.tokens.user_for_owner(event.owner_id).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => {
                info!(
                    subsystem = "engine",
                    component = "orchestrator",
                    owner_id = event.owner_id,
                    "Webhook event for unknown owner"
                );
                return EventOutcome::UnknownOwner {
                    owner_id: event.owner_id,
                };
            }
            Err(e) => {
                return EventOutcome::Failed {
                    owner_id: event.owner_id,
                    user_id: None,
                    error: e.to_string(),
                }
            }
        };

        let _guard = self.locks.acquire(user_id).await;
        match self.process_event(user_id, event.object_id).await {
            Ok(summary) => {
                info!(
                    subsystem = "engine",
                    component = "orchestrator",
                    op = "event",
                    user_id = %user_id,
                    external_id = event.object_id,
                    imported = summary.imported,
                    "Webhook event processed"
                );
                EventOutcome::Processed {
                    user_id,
                    external_id: event.object_id,
                    summary,
                }
            }
            Err(e) => {
                warn!(
                    subsystem = "engine",
                    component = "orchestrator",
                    op = "event",
                    user_id = %user_id,
                    external_id = event.object_id,
                    error = %e,
                    "Webhook event failed"
                );
                EventOutcome::Failed {
                    owner_id: event.owner_id,
                    user_id: Some(user_id),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn process_event(&self, user_id: Uuid, external_id: i64) -> Result<ImportSummary> {
        let mut tally = BatchTally::default();
        let mut cache = WriteCache::new();

        // An id already on record needs no detail fetch
        if self.aggregator.activities().exists(external_id).await? {
            tally.summary.total_seen = 1;
            tally.summary.record_skip(SkipReason::Duplicate);
            return Ok(tally.summary);
        }

        let raw = self.fetch_one(user_id, external_id).await?;
        self.aggregate_one(user_id, &raw, &mut cache, &mut tally)
            .await?;

        let receipt = self.aggregator.commit(&mut cache).await?;
        reclassify_lost_inserts(&mut tally.summary, receipt.duplicates.len());
        Ok(tally.summary)
    }

    /// Fetch one activity, refreshing the credential once if the feed rejects it.
    async fn fetch_one(&self, user_id: Uuid, external_id: i64) -> Result<RawActivity> {
        let credential = self.tokens.valid_credential(user_id).await?;
        match self.feed.get_one(&credential, external_id).await {
            Ok(raw) => Ok(raw),
            Err(e) if e.is_unauthorized() => {
                let fresh = self.tokens.force_refresh(user_id).await?;
                self.feed
                    .get_one(&fresh, external_id)
                    .await
                    .map_err(|e| match e {
                        e if e.is_unauthorized() => rejected_after_refresh(e).into(),
                        e => Error::Feed(e),
                    })
            }
            Err(e) => Err(Error::Feed(e)),
        }
    }
}

fn rejected_after_refresh(e: FeedError) -> CredentialError {
    CredentialError::RefreshFailed(format!("credential still rejected after refresh: {}", e))
}

/// Activities the commit found already inserted by a concurrent writer were
/// counted as imported; move them to the duplicate tally.
fn reclassify_lost_inserts(summary: &mut ImportSummary, lost: usize) {
    let lost = (lost as u32).min(summary.imported);
    summary.imported -= lost;
    summary.skipped_duplicate += lost;
}
