// =============================================================================
// History Ring — Bounded, append-only retention of snapshots and indicators
// =============================================================================
//
// The single piece of shared mutable state in the pipeline. Snapshots are
// appended by the cycle after aggregation; indicator values are appended after
// recomputation; everything else reads. Eviction is by max entry count or max
// age, whichever triggers first. Every read takes a point-in-time copy under
// the lock, so no reader can observe a half-appended cycle.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::indicators::{IndicatorName, IndicatorValue};
use crate::snapshot::MarketSnapshot;

struct Inner {
    snapshots: VecDeque<MarketSnapshot>,
    indicators: VecDeque<IndicatorValue>,
}

/// Ring buffer over recent snapshots and indicator history.
pub struct HistoryRing {
    inner: RwLock<Inner>,
    max_entries: usize,
    max_age: Duration,
}

impl HistoryRing {
    /// Create a ring retaining at most `max_entries` snapshots and entries
    /// older than `max_age_secs` relative to the newest append.
    pub fn new(max_entries: usize, max_age_secs: u64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                snapshots: VecDeque::with_capacity(max_entries.min(1024)),
                indicators: VecDeque::new(),
            }),
            max_entries,
            max_age: Duration::seconds(max_age_secs as i64),
        }
    }

    // ── Appends (cycle-sequenced, one critical section each) ────────────

    pub fn append_snapshot(&self, snapshot: MarketSnapshot) {
        let mut inner = self.inner.write();
        let newest = snapshot.at;
        inner.snapshots.push_back(snapshot);

        while inner.snapshots.len() > self.max_entries {
            inner.snapshots.pop_front();
        }
        let cutoff = newest - self.max_age;
        while inner
            .snapshots
            .front()
            .map_or(false, |s| s.at < cutoff)
        {
            inner.snapshots.pop_front();
        }
    }

    /// Append one cycle's recomputed indicator values. Superseded values stay
    /// in history for trend math; nothing is edited in place.
    pub fn append_indicators(&self, values: Vec<IndicatorValue>) {
        if values.is_empty() {
            return;
        }
        let mut inner = self.inner.write();
        let newest = values.iter().map(|v| v.at).max().unwrap_or_else(Utc::now);
        inner.indicators.extend(values);

        // Several indicator rows land per cycle, so the indicator deque gets
        // a proportionally larger count bound than the snapshot deque.
        let cap = self.max_entries.saturating_mul(8);
        while inner.indicators.len() > cap {
            inner.indicators.pop_front();
        }
        let cutoff = newest - self.max_age;
        while inner
            .indicators
            .front()
            .map_or(false, |v| v.at < cutoff)
        {
            inner.indicators.pop_front();
        }
    }

    // ── Reads (point-in-time consistent copies) ─────────────────────────

    pub fn latest_snapshot(&self) -> Option<MarketSnapshot> {
        self.inner.read().snapshots.back().cloned()
    }

    /// The most recent `count` snapshots, oldest first.
    pub fn recent_snapshots(&self, count: usize) -> Vec<MarketSnapshot> {
        let inner = self.inner.read();
        let start = inner.snapshots.len().saturating_sub(count);
        inner.snapshots.iter().skip(start).cloned().collect()
    }

    /// Snapshots within `window` of the newest snapshot, oldest first.
    pub fn snapshots_window(&self, window: Duration) -> Vec<MarketSnapshot> {
        let inner = self.inner.read();
        let Some(newest) = inner.snapshots.back().map(|s| s.at) else {
            return Vec::new();
        };
        let cutoff = newest - window;
        inner
            .snapshots
            .iter()
            .filter(|s| s.at >= cutoff)
            .cloned()
            .collect()
    }

    /// History of one named indicator within `window` of `reference`,
    /// oldest first.
    pub fn indicator_window(
        &self,
        name: IndicatorName,
        window: Duration,
        reference: DateTime<Utc>,
    ) -> Vec<IndicatorValue> {
        let cutoff = reference - window;
        self.inner
            .read()
            .indicators
            .iter()
            .filter(|v| v.name == name && v.at >= cutoff)
            .cloned()
            .collect()
    }

    pub fn snapshot_count(&self) -> usize {
        self.inner.read().snapshots.len()
    }

    pub fn indicator_count(&self) -> usize {
        self.inner.read().indicators.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
