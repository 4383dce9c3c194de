//! Per-pass performance accounting.

use std::collections::BTreeMap;
use std::time::Instant;

use compare_schema::PerfReport;

use crate::engine::{ReplayTurn, TurnSource};

/// Accumulates tick wall-times and integrity-hash samples over one pass.
///
/// Tick time is measured between observer callbacks, which the run primitive
/// fires at tick boundaries; the observer's own work is a constant shared by
/// both passes and cancels out of the delta.
#[derive(Debug, Default)]
pub struct PerfAccumulator {
    last_mark: Option<Instant>,
    durations_us: Vec<u64>,
    hash_samples: Vec<(u64, u64)>,
}

impl PerfAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of tick execution, called once at initialization.
    pub fn begin(&mut self) {
        self.last_mark = Some(Instant::now());
    }

    pub fn note_tick(&mut self, tick: u64, hash: u64) {
        self.note_tick_time();
        self.hash_samples.push((tick, hash));
    }

    /// Record timing only, for ticks where the hash observable failed.
    pub fn note_tick_without_hash(&mut self, _tick: u64) {
        self.note_tick_time();
    }

    fn note_tick_time(&mut self) {
        let now = Instant::now();
        if let Some(previous) = self.last_mark.replace(now) {
            self.durations_us
                .push(now.duration_since(previous).as_micros() as u64);
        }
    }

    pub fn finish(self, intent_counts: BTreeMap<String, u64>) -> PerfReport {
        PerfReport::from_samples(self.durations_us, intent_counts, self.hash_samples)
    }
}

/// Counts replay intents by kind while forwarding turns unchanged.
pub struct CountingTurnSource<'a> {
    inner: &'a mut dyn TurnSource,
    counts: BTreeMap<String, u64>,
}

impl<'a> CountingTurnSource<'a> {
    pub fn new(inner: &'a mut dyn TurnSource) -> Self {
        Self {
            inner,
            counts: BTreeMap::new(),
        }
    }

    pub fn into_counts(self) -> BTreeMap<String, u64> {
        self.counts
    }
}

impl TurnSource for CountingTurnSource<'_> {
    fn next_turn(&mut self) -> Option<ReplayTurn> {
        let turn = self.inner.next_turn()?;
        for intent in &turn.intents {
            *self.counts.entry(intent.kind.clone()).or_insert(0) += 1;
        }
        Some(turn)
    }
}
