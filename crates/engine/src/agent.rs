use chrono::{DateTime, Duration, Utc};
use krakenwatch_core::*;
use krakenwatch_reconcile::{snapshot, ReconcileError, Reconciler};
use serde::Serialize;
use std::future::Future;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Per-agent behavior, independent of the exchange credentials.
#[derive(Debug, Clone, Copy)]
pub struct AgentSettings {
    pub mode: Mode,
    /// Log payloads and per-order decisions.
    pub debug: bool,
    /// How long the agent may go without emitting before it is reported as not working.
    pub expected_receive_period: Duration,
    pub on_corrupt_snapshot: CorruptSnapshotPolicy,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            mode: Mode::EmitChangesOnly,
            debug: false,
            expected_receive_period: Duration::days(2),
            on_corrupt_snapshot: CorruptSnapshotPolicy::Fail,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("Failed to emit event: {0}")]
    Sink(#[from] SinkError),
    #[error("Memory store error: {0}")]
    Store(#[from] StoreError),
}

/// Summary of a completed poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub fetched: usize,
    pub emitted: usize,
    pub snapshot_updated: bool,
}

/// What a poll would do, without doing it.
#[derive(Debug, Clone, PartialEq)]
pub struct DryRun {
    pub would_emit: Vec<OpenOrder>,
    pub snapshot_would_change: bool,
}

/// Liveness view of an agent's memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    pub working: bool,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    /// Number of orders in the stored snapshot, if it parses.
    pub known_open_orders: Option<usize>,
}

/// Polls an order source, emits newly seen orders and keeps the snapshot.
///
/// Calls must be serialized per instance: `poll` does a read-modify-write
/// of the stored memory.
pub struct OpenOrderAgent<S, K, M> {
    source: S,
    sink: K,
    store: M,
    reconciler: Reconciler,
    settings: AgentSettings,
}

impl<S, K, M> OpenOrderAgent<S, K, M>
where
    S: OrderSource,
    K: EventSink,
    M: MemoryStore,
{
    pub fn new(source: S, sink: K, store: M, settings: AgentSettings) -> Self {
        let reconciler = Reconciler::new(settings.mode)
            .with_corrupt_snapshot_policy(settings.on_corrupt_snapshot);
        Self {
            source,
            sink,
            store,
            reconciler,
            settings,
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn store(&self) -> &M {
        &self.store
    }

    /// Fetch, reconcile, emit and persist.
    ///
    /// On failure nothing is emitted (unless the sink itself failed part-way)
    /// and the stored snapshot is left untouched; only the error time is recorded.
    pub async fn poll(&self) -> Result<PollReport, PollError> {
        let memory = self.store.load().await?;

        match self.poll_once(&memory).await {
            Ok((report, next)) => {
                self.store.save(&next).await?;
                Ok(report)
            }
            Err(e) => {
                self.record_failure(memory).await;
                Err(e)
            }
        }
    }

    async fn poll_once(&self, memory: &AgentMemory) -> Result<(PollReport, AgentMemory), PollError> {
        let orders = self.source.open_orders().await?;
        let fetched = orders.len();

        let outcome = self.reconciler.reconcile(memory.snapshot(), orders)?;
        let emitted = outcome.to_emit.len();
        let snapshot_updated = outcome.snapshot_changed();
        if self.settings.debug {
            info!(fetched, emitted, snapshot_updated, "Reconciled open orders");
        }

        for order in &outcome.to_emit {
            if self.settings.debug {
                info!(order_id = %order.id, payload = %order.payload, "Emitting order");
            }
            self.sink.emit(order).await?;
        }

        let now = Utc::now();
        let mut next = memory.clone();
        next.last_success_at = Some(now);
        if emitted > 0 {
            next.last_event_at = Some(now);
        }
        if let Some(snapshot) = outcome.next_snapshot {
            next.last_status = Some(snapshot);
        }

        Ok((
            PollReport {
                fetched,
                emitted,
                snapshot_updated,
            },
            next,
        ))
    }

    async fn record_failure(&self, mut memory: AgentMemory) {
        memory.last_error_at = Some(Utc::now());
        if let Err(e) = self.store.save(&memory).await {
            warn!(error = %e, "Could not record poll failure");
        }
    }

    /// Fetch and reconcile, but emit nothing and persist nothing.
    pub async fn dry_run(&self) -> Result<DryRun, PollError> {
        let memory = self.store.load().await?;
        let orders = self.source.open_orders().await?;
        let outcome = self.reconciler.reconcile(memory.snapshot(), orders)?;
        Ok(DryRun {
            snapshot_would_change: outcome.snapshot_changed(),
            would_emit: outcome.to_emit,
        })
    }

    /// Whether the agent emitted recently and its last poll did not fail.
    pub async fn is_working(&self, now: DateTime<Utc>) -> Result<bool, PollError> {
        Ok(self.status(now).await?.working)
    }

    pub async fn status(&self, now: DateTime<Utc>) -> Result<AgentStatus, PollError> {
        let memory = self.store.load().await?;
        let working = memory.event_created_within(self.settings.expected_receive_period, now)
            && !memory.has_recent_error();
        let known_open_orders = memory
            .snapshot()
            .filter(|s| !s.is_empty())
            .and_then(|s| snapshot::parse(s).ok())
            .map(|orders| orders.len());

        Ok(AgentStatus {
            working,
            last_event_at: memory.last_event_at,
            last_success_at: memory.last_success_at,
            last_error_at: memory.last_error_at,
            known_open_orders,
        })
    }

    /// Poll on a fixed cadence until `shutdown` resolves.
    ///
    /// Polls never overlap; a failed poll is logged and the next tick proceeds.
    pub async fn run<F>(&self, every: std::time::Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(every_secs = every.as_secs_f64(), mode = ?self.settings.mode, "Agent started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Agent stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.poll().await {
                        Ok(report) => info!(
                            fetched = report.fetched,
                            emitted = report.emitted,
                            snapshot_updated = report.snapshot_updated,
                            "Poll complete"
                        ),
                        Err(e) => error!(error = %e, "Poll failed"),
                    }
                }
            }
        }
    }
}
