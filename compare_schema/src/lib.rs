//! Serializable data contracts for the engine-comparison harness.
//!
//! Everything captured during a reference pass and everything reported after
//! a comparison pass is expressed here as plain serde structs, so a captured
//! state can be persisted and the two passes can execute in separate process
//! lifetimes. Maps that cross the serialization boundary are keyed by strings
//! and kept in `BTreeMap`s for a stable, diffable JSON form.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Last tick of the spawn phase. Random-stream snapshots are recorded only
/// for ticks `0..=SPAWN_PHASE_TICKS`; past that boundary the integrity-hash
/// comparison is the only divergence signal.
pub const SPAWN_PHASE_TICKS: u64 = 30;

/// Maximum number of per-player coordinates sampled into the spawn-phase
/// snapshot.
pub const COORD_SAMPLE_LIMIT: usize = 100;

/// Identity of a random stream: its seed plus a zero-based creation-order
/// index among streams sharing that seed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StreamKey {
    pub seed: u64,
    pub index: u32,
}

impl StreamKey {
    pub fn new(seed: u64, index: u32) -> Self {
        Self { seed, index }
    }

    /// String form used as a serialized map key.
    pub fn as_map_key(&self) -> String {
        format!("{}:{}", self.seed, self.index)
    }

    /// Inverse of [`StreamKey::as_map_key`].
    pub fn parse_map_key(raw: &str) -> Option<Self> {
        let (seed, index) = raw.split_once(':')?;
        Some(Self {
            seed: seed.parse().ok()?,
            index: index.parse().ok()?,
        })
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seed, self.index)
    }
}

/// Opaque serialized generator state. The harness only moves these bytes
/// between a live stream and a captured snapshot; it never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState(pub Vec<u8>);

impl StreamState {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A spawn placement captured from the reference pass. Re-imposed on the
/// comparison pass for any spawn intent whose player id appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnAssignment {
    pub player_id: String,
    pub tile: u64,
    pub coords: (u32, u32),
    pub name: String,
    pub kind: String,
}

/// Fixed set of configuration scalars compared between the two checkouts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigScalars {
    pub game_mode: String,
    pub map_name: String,
    pub bot_count: u32,
    pub spawn_phase_turns: u32,
    pub disabled_units: u32,
}

/// Validation snapshot taken once setup completes, before any tick executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitSnapshot {
    pub tick: u64,
    pub player_count: u32,
    pub player_ids: BTreeSet<String>,
    pub integrity_hash: u64,
}

/// Per-player territory footprint at the spawn-phase boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerFootprint {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub tiles_owned: u64,
    pub sampled_coords: Vec<(u32, u32)>,
}

/// Validation snapshot taken once at the end of the spawn phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnPhaseSnapshot {
    pub tick: u64,
    pub players: BTreeMap<String, PlayerFootprint>,
    pub integrity_hash: u64,
}

/// Immutable artifact of a reference pass, read-only once produced.
///
/// The snapshot fields stay `None` when the corresponding capture failed;
/// capture failure never aborts a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapturedState {
    /// Generated identifiers in event order.
    pub identifiers: Vec<String>,
    /// Per-tick stream states, outer key tick, inner key [`StreamKey`] in
    /// map-key form. Populated only for ticks `0..=SPAWN_PHASE_TICKS`.
    pub stream_snapshots: BTreeMap<u64, BTreeMap<String, StreamState>>,
    /// Spawn placements keyed by player id, last write per player.
    pub spawn_assignments: BTreeMap<String, SpawnAssignment>,
    /// Content hash of the loaded terrain data.
    pub terrain_hash: u64,
    /// Ordered manifest of named map features.
    pub map_manifest: Vec<String>,
    pub config: ConfigScalars,
    pub init_snapshot: Option<InitSnapshot>,
    pub spawn_snapshot: Option<SpawnPhaseSnapshot>,
}

/// Category of a non-fatal injection diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// The comparison run generated more identifiers than were captured.
    ExtraIdentifiers,
    /// Captured identifiers were left unconsumed at the end of the run.
    UnusedIdentifiers,
    PlayerCountMismatch,
    MissingPlayer,
    ExtraPlayer,
    TileCountMismatch,
    HashMismatch,
    TerrainHashMismatch,
    ManifestMismatch,
    ConfigMismatch,
    /// No captured snapshot existed to validate against.
    MissingSnapshot,
    /// Rebuilding an observable for validation failed.
    SnapshotRebuild,
    StreamRestore,
}

/// Non-fatal diagnostic emitted by the injection pass.
///
/// Warnings never halt a run; they only qualify how its performance numbers
/// should be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl InjectionWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for InjectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

/// Performance artifact of a single pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerfReport {
    pub ticks: u64,
    pub total_us: u64,
    pub mean_us: f64,
    pub min_us: u64,
    pub max_us: u64,
    pub p95_us: u64,
    /// Replay intents executed, counted by intent kind.
    pub intent_counts: BTreeMap<String, u64>,
    /// `(tick, integrity_hash)` samples, one per observed tick.
    pub hash_samples: Vec<(u64, u64)>,
}

impl PerfReport {
    /// Reduce raw per-tick wall times (µs) into a distribution summary.
    pub fn from_samples(
        durations_us: Vec<u64>,
        intent_counts: BTreeMap<String, u64>,
        hash_samples: Vec<(u64, u64)>,
    ) -> Self {
        let ticks = durations_us.len() as u64;
        let total_us: u64 = durations_us.iter().sum();
        let mean_us = if ticks > 0 {
            total_us as f64 / ticks as f64
        } else {
            0.0
        };
        let min_us = durations_us.iter().copied().min().unwrap_or(0);
        let max_us = durations_us.iter().copied().max().unwrap_or(0);
        let p95_us = percentile(&durations_us, 95);
        Self {
            ticks,
            total_us,
            mean_us,
            min_us,
            max_us,
            p95_us,
            intent_counts,
            hash_samples,
        }
    }
}

fn percentile(samples: &[u64], pct: u64) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    // Nearest-rank: smallest sample with at least pct% of samples at or
    // below it.
    let rank = (sorted.len() as u64 * pct + 99) / 100;
    sorted[rank.saturating_sub(1) as usize]
}

/// Final aggregate of a comparison: both pass reports, tick-time deltas,
/// integrity-hash agreement, and every warning the injection pass emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub reference: PerfReport,
    pub comparison: PerfReport,
    /// `comparison.mean_us - reference.mean_us`; negative means faster.
    pub mean_tick_delta_us: f64,
    pub total_delta_us: i64,
    pub hashes_compared: u64,
    pub hashes_matched: u64,
    /// First tick where both passes sampled a hash and they disagreed.
    pub first_divergence: Option<u64>,
    pub warnings: Vec<InjectionWarning>,
}

impl ComparisonReport {
    pub fn from_passes(
        reference: PerfReport,
        comparison: PerfReport,
        warnings: Vec<InjectionWarning>,
    ) -> Self {
        let comparison_hashes: BTreeMap<u64, u64> =
            comparison.hash_samples.iter().copied().collect();
        let mut hashes_compared = 0;
        let mut hashes_matched = 0;
        let mut first_divergence = None;
        for (tick, reference_hash) in &reference.hash_samples {
            if let Some(comparison_hash) = comparison_hashes.get(tick) {
                hashes_compared += 1;
                if comparison_hash == reference_hash {
                    hashes_matched += 1;
                } else if first_divergence.is_none() {
                    first_divergence = Some(*tick);
                }
            }
        }
        let mean_tick_delta_us = comparison.mean_us - reference.mean_us;
        let total_delta_us = comparison.total_us as i64 - reference.total_us as i64;
        Self {
            reference,
            comparison,
            mean_tick_delta_us,
            total_delta_us,
            hashes_compared,
            hashes_matched,
            first_divergence,
            warnings,
        }
    }
}
