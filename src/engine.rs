// =============================================================================
// Sentinel Engine — Shared state and the periodic pipeline cycle
// =============================================================================
//
// `SentinelState` is the single shared handle: pollers write the reading
// board, the cycle loop drives the pipeline, the API reads the results. One
// cycle runs the fixed sequence sample -> assemble -> append -> recompute ->
// detect -> score; stages never run concurrently with each other, so every
// stage sees the exact output of the previous one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::detector::{AnomalyDetector, Event};
use crate::engine_config::EngineConfig;
use crate::history::HistoryRing;
use crate::indicators::{IndicatorEngine, IndicatorSet};
use crate::scoring::{ScoreEngine, ScoreResult};
use crate::snapshot::{assemble, MarketSnapshot};
use crate::sources::ReadingBoard;

/// Bound on the in-memory event log served by the API.
const MAX_EVENT_LOG: usize = 500;

pub struct SentinelState {
    pub config: EngineConfig,
    pub board: Arc<ReadingBoard>,
    pub ring: HistoryRing,
    indicator_engine: IndicatorEngine,
    score_engine: ScoreEngine,
    detector: Mutex<AnomalyDetector>,
    events: RwLock<VecDeque<Event>>,
    last_indicators: RwLock<IndicatorSet>,
    last_score: RwLock<Option<ScoreResult>>,
    cycle_count: AtomicU64,
    pub started_at: DateTime<Utc>,
}

impl SentinelState {
    pub fn new(config: EngineConfig) -> Self {
        let ring = HistoryRing::new(config.max_ring_entries, config.max_ring_age_secs);
        Self {
            board: Arc::new(ReadingBoard::new()),
            ring,
            indicator_engine: IndicatorEngine::new(config.clone()),
            score_engine: ScoreEngine::new(config.clone()),
            detector: Mutex::new(AnomalyDetector::new()),
            events: RwLock::new(VecDeque::new()),
            last_indicators: RwLock::new(IndicatorSet::new()),
            last_score: RwLock::new(None),
            cycle_count: AtomicU64::new(0),
            started_at: Utc::now(),
            config,
        }
    }

    /// Run one full pipeline cycle at `now`.
    ///
    /// Degraded input degrades the outputs, it never aborts the cycle. The
    /// only `Err` is a fatal configuration problem (no enabled adapters, no
    /// required fields): no meaningful snapshot can ever exist, so the cycle
    /// halts instead of silently producing empty output forever.
    pub fn run_cycle(&self, now: DateTime<Utc>) -> Result<ScoreResult> {
        self.config
            .validate()
            .context("fatal configuration error, cycle halted")?;

        let cycle = self.cycle_count.fetch_add(1, Ordering::Relaxed) + 1;

        // 1. Sample the board and fold into one snapshot.
        let readings = self.board.sample();
        let snapshot = assemble(&readings, now, &self.config);
        if snapshot.degraded {
            warn!(
                cycle,
                degraded_fields = ?snapshot.degraded_fields,
                "snapshot degraded - required fields stale or missing"
            );
        }
        self.ring.append_snapshot(snapshot);

        // 2. Recompute indicators over the updated ring.
        let indicators = self.indicator_engine.recompute(&self.ring);
        self.ring
            .append_indicators(indicators.values().cloned().collect());

        // 3. Detect anomalies against rules and history.
        let events = self
            .detector
            .lock()
            .detect(&self.ring, &indicators, &self.config, now);
        if !events.is_empty() {
            let mut log = self.events.write();
            for event in &events {
                log.push_back(event.clone());
            }
            while log.len() > MAX_EVENT_LOG {
                log.pop_front();
            }
        }

        // 4. Score the indicator set.
        let score = self.score_engine.score(&indicators, now);

        info!(
            cycle,
            providers = readings.len(),
            indicators = indicators.len(),
            events = events.len(),
            long = score.long_score,
            short = score.short_score,
            bias = ?score.bias,
            "cycle complete"
        );

        *self.last_indicators.write() = indicators;
        *self.last_score.write() = Some(score.clone());
        Ok(score)
    }

    // ── Read accessors for the API layer ────────────────────────────────

    pub fn last_score(&self) -> Option<ScoreResult> {
        self.last_score.read().clone()
    }

    pub fn last_indicators(&self) -> IndicatorSet {
        self.last_indicators.read().clone()
    }

    pub fn latest_snapshot(&self) -> Option<MarketSnapshot> {
        self.ring.latest_snapshot()
    }

    /// Events at or after `since`, oldest first.
    pub fn events_since(&self, since: DateTime<Utc>) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.at >= since)
            .cloned()
            .collect()
    }

    pub fn recent_events(&self, count: usize) -> Vec<Event> {
        let log = self.events.read();
        let start = log.len().saturating_sub(count);
        log.iter().skip(start).cloned().collect()
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycle_count.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
