//! Two-phase ClinVar search over a variant collection.
//!
//! Orchestrates one run:
//!   1. Identifier search: one paced esearch per searchable record
//!   2. Summary fetch: one paced esummary per record that found identifiers
//!   3. Progress events every `progress_interval` records via broadcast channel
//!
//! Phase 1 never stops the run: a bad or failed response leaves that record
//! with no identifiers. In phase 2 a fatal response stops the run at the
//! failing record; records already processed keep their summaries.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

use crate::aggregate::{parse_identifiers, parse_summaries};
use crate::models::{SearchState, VariantRecord};
use crate::query::{QueryBuilder, QueryPolicy, SummaryQuery, DEFAULT_RETMAX};
use crate::rate_limit::{RateLimiter, DEFAULT_REQUESTS_PER_WINDOW, DEFAULT_WINDOW};
use crate::sources::LookupService;

pub const DEFAULT_PROGRESS_INTERVAL: usize = 10;

// ── Run config ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub policy: QueryPolicy,
    pub retmax: usize,
    pub requests_per_window: u32,
    pub window: Duration,
    /// Emit a progress event every N records.
    pub progress_interval: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            policy: QueryPolicy::default(),
            retmax: DEFAULT_RETMAX,
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            window: DEFAULT_WINDOW,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

// ── Progress events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    IdentifierSearch,
    SummaryFetch,
}

impl SearchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchPhase::IdentifierSearch => "identifier_search",
            SearchPhase::SummaryFetch     => "summary_fetch",
        }
    }
}

/// Informational progress event (cloneable for broadcast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchProgress {
    pub phase: SearchPhase,
    /// One-based position of the record about to be processed.
    pub index: usize,
    pub total: usize,
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Empty input; nothing was searched.
    NoVariants,
    Completed,
    /// A fatal condition stopped the run at record `index` (zero-based).
    Aborted {
        phase: SearchPhase,
        index: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub total: usize,
    pub searchable: usize,
    /// Records whose phase-1 response was unusable and were degraded to no identifiers.
    pub degraded: usize,
    pub with_identifiers: usize,
    pub summarised: usize,
    pub requests: usize,
    pub duration_ms: u64,
}

impl RunReport {
    fn new(total: usize) -> Self {
        Self {
            outcome: RunOutcome::Completed,
            total,
            searchable: 0,
            degraded: 0,
            with_identifiers: 0,
            summarised: 0,
            requests: 0,
            duration_ms: 0,
        }
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct SearchOrchestrator {
    service: Arc<dyn LookupService>,
    builder: QueryBuilder,
    limiter: RateLimiter,
    progress_interval: usize,
    progress_tx: Option<broadcast::Sender<SearchProgress>>,
}

impl SearchOrchestrator {
    pub fn new(service: Arc<dyn LookupService>, config: &SearchConfig) -> Self {
        Self {
            service,
            builder: QueryBuilder::new(config.policy, config.retmax),
            limiter: RateLimiter::new(config.requests_per_window, config.window),
            progress_interval: config.progress_interval.max(1),
            progress_tx: None,
        }
    }

    /// Also send progress events to `tx`.
    pub fn with_progress(mut self, tx: broadcast::Sender<SearchProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    fn emit(&self, phase: SearchPhase, i: usize, total: usize) {
        if i % self.progress_interval != 0 {
            return;
        }
        info!(phase = phase.as_str(), index = i + 1, total, "Search progress");
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(SearchProgress { phase, index: i + 1, total });
        }
    }

    /// Run both phases over `records`, mutating their search state in place.
    #[instrument(skip(self, records), fields(total = records.len(), policy = ?self.builder.policy()))]
    pub async fn run(&self, records: &mut [VariantRecord]) -> RunReport {
        let t0 = std::time::Instant::now();
        let mut report = RunReport::new(records.len());

        if records.is_empty() {
            warn!("No variants to process");
            report.outcome = RunOutcome::NoVariants;
            return report;
        }
        report.searchable = records.iter().filter(|r| r.is_searchable()).count();

        info!(searchable = report.searchable, "Phase 1: searching ClinVar identifiers");
        self.search_identifiers(records, &mut report).await;

        info!(with_identifiers = report.with_identifiers, "Phase 2: fetching ClinVar summaries");
        if let Some(outcome) = self.fetch_summaries(records, &mut report).await {
            report.outcome = outcome;
        }

        report.duration_ms = t0.elapsed().as_millis() as u64;
        match &report.outcome {
            RunOutcome::Aborted { index, reason, .. } => {
                error!(index, reason = %reason, "Search aborted");
            }
            _ => info!(
                summarised = report.summarised,
                requests = report.requests,
                duration_ms = report.duration_ms,
                "Search completed"
            ),
        }
        report
    }

    async fn search_identifiers(&self, records: &mut [VariantRecord], report: &mut RunReport) {
        let total = records.len();

        for (i, record) in records.iter_mut().enumerate() {
            self.emit(SearchPhase::IdentifierSearch, i, total);
            if record.state() != &SearchState::Unsearched {
                continue;
            }

            self.limiter.acquire().await;
            let query = self.builder.identifier_query(record);
            report.requests += 1;

            let identifiers = match self.service.execute(&query).await {
                Ok(body) => match parse_identifiers(&body) {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!(row = record.variant.row, error = %e, "Treating record as having no ClinVar entries");
                        report.degraded += 1;
                        Vec::new()
                    }
                },
                Err(e) => {
                    warn!(row = record.variant.row, error = %e, "esearch request failed; treating record as having no ClinVar entries");
                    report.degraded += 1;
                    Vec::new()
                }
            };

            if !identifiers.is_empty() {
                report.with_identifiers += 1;
            }
            record.record_identifiers(identifiers);
        }
    }

    /// Returns the abort outcome if the phase stopped early.
    async fn fetch_summaries(
        &self,
        records: &mut [VariantRecord],
        report: &mut RunReport,
    ) -> Option<RunOutcome> {
        let total = records.len();

        for (i, record) in records.iter_mut().enumerate() {
            self.emit(SearchPhase::SummaryFetch, i, total);
            if !record.is_searchable() {
                continue;
            }
            let query = match self.builder.summary_query(record) {
                SummaryQuery::Fetch(q) => q,
                SummaryQuery::Skip => continue,
            };

            self.limiter.acquire().await;
            report.requests += 1;

            let abort = |reason: String| RunOutcome::Aborted {
                phase: SearchPhase::SummaryFetch,
                index: i,
                reason,
            };

            let body = match self.service.execute(&query).await {
                Ok(body) => body,
                Err(e) => return Some(abort(format!("esummary request failed: {e}"))),
            };
            match parse_summaries(&body) {
                Ok(summaries) => {
                    record.record_summaries(summaries);
                    report.summarised += 1;
                }
                Err(e) => return Some(abort(e.to_string())),
            }
        }
        None
    }
}
