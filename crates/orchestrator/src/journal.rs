use crate::SagaState;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// How long a finished saga is remembered by default.
pub const DEFAULT_JOURNAL_RETENTION: Duration = Duration::from_secs(600);

#[derive(Clone, Debug)]
struct JournalEntry {
    recorded_at: Instant,
    state: SagaState,
}

#[derive(Debug)]
struct Inner {
    created_at: Instant,
    last_sweep_millis: AtomicU64,
    retention: Duration,
    states: DashMap<String, JournalEntry>,
}

/// Last successfully published state of each saga, keyed by transaction id.
///
/// Lets a redelivered command resume where its saga stopped instead of
/// emitting the same events twice. Finished sagas are dropped once they are
/// older than the retention window; unfinished ones are kept. Process-local
/// only.
#[derive(Clone, Debug)]
pub struct SagaJournal {
    inner: Arc<Inner>,
}

impl Default for SagaJournal {
    fn default() -> Self {
        Self::new(DEFAULT_JOURNAL_RETENTION)
    }
}

impl SagaJournal {
    /// Creates an empty journal that forgets finished sagas after
    /// `retention`.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                created_at: Instant::now(),
                last_sweep_millis: AtomicU64::new(0),
                retention,
                states: DashMap::new(),
            }),
        }
    }

    /// How long finished sagas are kept.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.inner.retention
    }

    /// The recorded state of a transaction's saga.
    #[must_use]
    pub fn get(&self, transaction_id: &str) -> Option<SagaState> {
        self.inner
            .states
            .get(transaction_id)
            .map(|entry| entry.value().state.clone())
    }

    /// Records that a saga reached `state`, evicting expired finished sagas
    /// at most once per quarter of the retention window.
    pub fn record(&self, transaction_id: &str, state: SagaState) {
        self.inner.states.insert(
            transaction_id.to_string(),
            JournalEntry {
                recorded_at: Instant::now(),
                state,
            },
        );

        if self.sweep_due() {
            self.evict_expired();
        }
    }

    /// Drops every finished saga recorded longer ago than the retention
    /// window. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let before = self.inner.states.len();
        let retention = self.inner.retention;

        self.inner.states.retain(|_, entry| {
            !entry.state.is_terminal() || entry.recorded_at.elapsed() < retention
        });

        let evicted = before.saturating_sub(self.inner.states.len());
        if evicted > 0 {
            debug!("evicted {evicted} finished sagas from the journal");
        }
        evicted
    }

    /// Forgets a transaction.
    pub fn forget(&self, transaction_id: &str) -> Option<SagaState> {
        self.inner
            .states
            .remove(transaction_id)
            .map(|(_, entry)| entry.state)
    }

    /// Number of tracked sagas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.states.len()
    }

    /// Whether no saga is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.states.is_empty()
    }

    fn sweep_due(&self) -> bool {
        let interval = u64::try_from((self.inner.retention / 4).as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        let now = u64::try_from(self.inner.created_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        let last = self.inner.last_sweep_millis.load(Ordering::Relaxed);

        now.saturating_sub(last) >= interval
            && self
                .inner
                .last_sweep_millis
                .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
    }
}
