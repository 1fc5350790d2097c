//! Fixed-interval poll loop.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//!   Idle ──► Fetching ──► Processing ──► Sleeping ──► Fetching ...
//!              │  ▲            │
//!              │  └────────────┘  (range stopped short of the head)
//!              └──► Sleeping      (nothing new, or the origin failed)
//! ```
//!
//! Each transition is one call to [`PollLoop::step`], so tests can drive the
//! loop state by state. [`PollLoop::run`] just steps until the stop flag is
//! cleared. The flag is checked at every state boundary except the one
//! between a fetch and its processing, so an in-flight batch always completes
//! or rolls back as a whole.
//!
//! When the node refuses a range as too large (JSON-RPC `-32005`), the span
//! is halved and the fetch retried at once; each committed batch lets it grow
//! back toward `max_block_range`.
//!
//! A batch is one block range. Every entry of the range is decoded and
//! reconciled inside one store transaction, and the cursor is advanced to the
//! end of the range in that same transaction. If anything fails at the store
//! level the transaction rolls back, the cursor stays put and the same range
//! is fetched again after the next sleep.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy_primitives::Address;
use metrics::{counter, gauge};
use tracemirror_core::{RawLogEntry, Registry, decode};
use tracing::{debug, error, info, warn};

use crate::error::OriginError;
use crate::origin::{LogFilter, Origin};
use crate::reconcile::{Applied, Reconciler};
use crate::store::{StoreGateway, save_cursor};

/// JSON-RPC error code for a log query over the node's result or range limit.
const LIMIT_EXCEEDED: i64 = -32005;

/// Poll loop settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Contract addresses to fetch logs for.
    pub addresses: Vec<Address>,
    /// Wait between polls once caught up.
    pub interval: Duration,
    /// First block when the store has no cursor (default: origin head).
    pub start_block: Option<u64>,
    /// Largest number of blocks fetched per batch.
    pub max_block_range: u64,
    /// Blocks to stay behind the origin head.
    pub confirmations: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            interval: Duration::from_secs(10),
            start_block: None,
            max_block_range: 2000,
            confirmations: 0,
        }
    }
}

/// Where the loop is.
#[derive(Debug)]
pub enum PollState {
    /// Not yet positioned; the next step resolves the starting block.
    Idle,
    /// Ready to ask the origin for the next range.
    Fetching,
    /// A range has been fetched and is waiting to be applied.
    Processing(FetchedBatch),
    /// Waiting out the poll interval.
    Sleeping,
}

impl PollState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Processing(_) => "processing",
            Self::Sleeping => "sleeping",
        }
    }
}

/// Entries fetched for one inclusive block range.
#[derive(Debug, Clone)]
pub struct FetchedBatch {
    pub from_block: u64,
    pub to_block: u64,
    pub entries: Vec<RawLogEntry>,
    /// The range ends at the safe head, so there is nothing more to fetch yet.
    pub caught_up: bool,
}

/// Per-entry outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryCounts {
    pub projected: u64,
    pub audit_only: u64,
    pub replayed: u64,
    pub skipped_unknown_role: u64,
    pub decode_failures: u64,
    pub removed: u64,
}

impl EntryCounts {
    fn record(&mut self, applied: Applied) {
        match applied {
            Applied::Projected => self.projected += 1,
            Applied::AuditOnly => self.audit_only += 1,
            Applied::Replayed => self.replayed += 1,
            Applied::SkippedUnknownRole => self.skipped_unknown_role += 1,
        }
    }

    fn add(&mut self, other: &Self) {
        self.projected += other.projected;
        self.audit_only += other.audit_only;
        self.replayed += other.replayed;
        self.skipped_unknown_role += other.skipped_unknown_role;
        self.decode_failures += other.decode_failures;
        self.removed += other.removed;
    }

    fn emit_metrics(&self) {
        for (applied, count) in [
            (Applied::Projected, self.projected),
            (Applied::AuditOnly, self.audit_only),
            (Applied::Replayed, self.replayed),
            (Applied::SkippedUnknownRole, self.skipped_unknown_role),
        ] {
            if count > 0 {
                counter!("sync_entries_total", "outcome" => applied.as_str()).increment(count);
            }
        }
        if self.decode_failures > 0 {
            counter!("sync_decode_failures_total").increment(self.decode_failures);
        }
    }
}

/// Totals over the life of a [`PollLoop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    pub batches_committed: u64,
    pub batches_failed: u64,
    pub fetch_failures: u64,
    pub entries: EntryCounts,
}

/// The sync engine's single long-running task.
pub struct PollLoop<O> {
    origin: O,
    registry: Arc<Registry>,
    reconciler: Arc<Reconciler>,
    gateway: StoreGateway,
    config: PollConfig,
    /// Next block to fetch; `None` until the loop has left `Idle`.
    next_block: Option<u64>,
    /// Current blocks per fetch, at most `config.max_block_range`.
    span: u64,
    running: Arc<AtomicBool>,
    stats: PollStats,
}

impl<O: Origin> PollLoop<O> {
    pub fn new(
        origin: O,
        registry: Arc<Registry>,
        reconciler: Reconciler,
        gateway: StoreGateway,
        config: PollConfig,
    ) -> Self {
        let span = config.max_block_range.max(1);
        Self {
            origin,
            registry,
            reconciler: Arc::new(reconciler),
            gateway,
            config,
            next_block: None,
            span,
            running: Arc::new(AtomicBool::new(true)),
            stats: PollStats::default(),
        }
    }

    /// Use `running` as the stop flag. Clearing it stops [`run`](Self::run)
    /// at the next state boundary, after any fetched batch has been processed.
    pub fn with_running(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn next_block(&self) -> Option<u64> {
        self.next_block
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    /// Step until the stop flag is cleared.
    pub async fn run(mut self) -> PollStats {
        info!(origin = self.origin.name(), "poll loop starting");
        gauge!("sync_running").set(1.0);

        let mut state = PollState::Idle;
        loop {
            let in_flight = matches!(state, PollState::Processing(_));
            if !in_flight && !self.running.load(Ordering::SeqCst) {
                break;
            }
            state = self.step(state).await;
        }

        gauge!("sync_running").set(0.0);
        info!(
            batches = self.stats.batches_committed,
            failed = self.stats.batches_failed,
            next_block = ?self.next_block,
            "poll loop stopped"
        );
        self.stats
    }

    /// Perform one transition.
    pub async fn step(&mut self, state: PollState) -> PollState {
        match state {
            PollState::Idle => self.resolve_start().await,
            PollState::Fetching => self.fetch().await,
            PollState::Processing(batch) => self.process(batch).await,
            PollState::Sleeping => {
                tokio::time::sleep(self.config.interval).await;
                if self.next_block.is_some() {
                    PollState::Fetching
                } else {
                    PollState::Idle
                }
            }
        }
    }

    /// Position the loop from the stored cursor, the configured start block,
    /// or the origin head, in that order.
    async fn resolve_start(&mut self) -> PollState {
        let cursor = match self.gateway.cursor().await {
            Ok(cursor) => cursor,
            Err(e) => {
                error!(error = %e, "failed to read sync cursor");
                return PollState::Sleeping;
            }
        };

        let next = match (cursor, self.config.start_block) {
            (Some(block), _) => block + 1,
            (None, Some(start)) => start,
            (None, None) => match self.origin.block_number().await {
                Ok(head) => head.saturating_sub(self.config.confirmations),
                Err(e) => {
                    warn!(error = %e, "origin unavailable, cannot resolve start block");
                    self.stats.fetch_failures += 1;
                    counter!("sync_fetch_failures_total").increment(1);
                    return PollState::Sleeping;
                }
            },
        };

        info!(cursor = ?cursor, next_block = next, "sync positioned");
        self.next_block = Some(next);
        PollState::Fetching
    }

    async fn fetch(&mut self) -> PollState {
        let Some(from_block) = self.next_block else {
            return PollState::Idle;
        };

        let head = match self.origin.block_number().await {
            Ok(head) => head,
            Err(e) => return self.fetch_failed(e),
        };

        let safe_head = head.saturating_sub(self.config.confirmations);
        if from_block > safe_head {
            debug!(next_block = from_block, safe_head, "no new blocks");
            return PollState::Sleeping;
        }

        let to_block = safe_head.min(from_block.saturating_add(self.span - 1));
        let filter = LogFilter {
            from_block,
            to_block,
            addresses: self.config.addresses.clone(),
        };

        match self.origin.logs(&filter).await {
            Ok(entries) => {
                debug!(from_block, to_block, entries = entries.len(), "fetched batch");
                PollState::Processing(FetchedBatch {
                    from_block,
                    to_block,
                    entries,
                    caught_up: to_block == safe_head,
                })
            }
            Err(OriginError::Rpc {
                code: LIMIT_EXCEEDED,
                message,
            }) if self.span > 1 => {
                self.span = (self.span / 2).max(1);
                warn!(
                    from_block,
                    to_block,
                    span = self.span,
                    error = %message,
                    "range refused by origin, narrowing"
                );
                PollState::Fetching
            }
            Err(e) => self.fetch_failed(e),
        }
    }

    fn fetch_failed(&mut self, error: impl std::fmt::Display) -> PollState {
        warn!(error = %error, next_block = ?self.next_block, "origin unavailable, retrying next interval");
        self.stats.fetch_failures += 1;
        counter!("sync_fetch_failures_total").increment(1);
        PollState::Sleeping
    }

    /// Apply a fetched batch in one transaction.
    async fn process(&mut self, batch: FetchedBatch) -> PollState {
        let FetchedBatch {
            from_block,
            to_block,
            entries,
            caught_up,
        } = batch;
        let total = entries.len();
        let registry = Arc::clone(&self.registry);
        let reconciler = Arc::clone(&self.reconciler);

        let result = self
            .gateway
            .with_batch(move |tx| {
                let mut counts = EntryCounts::default();

                for entry in &entries {
                    if entry.removed {
                        debug!(tx_hash = %entry.tx_hash, "skipping removed log");
                        counts.removed += 1;
                        continue;
                    }

                    let event = match decode(entry, &registry) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(
                                topic0 = ?entry.classification_key(),
                                tx_hash = %entry.tx_hash,
                                log_index = entry.log_index,
                                error = %e,
                                "failed to decode log, skipping"
                            );
                            counts.decode_failures += 1;
                            continue;
                        }
                    };

                    counts.record(reconciler.apply(&event, tx)?);
                }

                save_cursor(tx, to_block)?;
                Ok(counts)
            })
            .await;

        match result {
            Ok(counts) => {
                self.next_block = Some(to_block + 1);
                self.span = self.span.saturating_mul(2).min(self.config.max_block_range.max(1));
                self.stats.batches_committed += 1;
                self.stats.entries.add(&counts);

                counts.emit_metrics();
                counter!("sync_batches_committed_total").increment(1);
                gauge!("sync_cursor_block").set(to_block as f64);

                info!(
                    from_block,
                    to_block,
                    entries = total,
                    projected = counts.projected,
                    replayed = counts.replayed,
                    "batch committed"
                );

                if caught_up {
                    PollState::Sleeping
                } else {
                    PollState::Fetching
                }
            }
            Err(e) => {
                error!(
                    from_block,
                    to_block,
                    error = %e,
                    "batch rolled back, retrying next interval"
                );
                self.stats.batches_failed += 1;
                counter!("sync_batches_failed_total").increment(1);
                PollState::Sleeping
            }
        }
    }
}
