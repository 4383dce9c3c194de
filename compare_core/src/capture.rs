//! Reference-pass observation.
//!
//! The collector watches one trusted run and records everything the
//! injection pass will later re-impose: identifier order, spawn placements,
//! per-tick stream states through the spawn phase, map/config fingerprints,
//! and the two validation snapshots. A failed capture logs and leaves the
//! field empty; it never aborts the run being measured.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::warn;

use compare_schema::{CapturedState, PerfReport, SpawnAssignment, SPAWN_PHASE_TICKS};

use crate::engine::{
    GameStateView, IdentifierDecorator, OwnershipChange, RunObserver, SpawnDecorator, SpawnIntent,
};
use crate::registry::SharedRegistry;
use crate::report::PerfAccumulator;
use crate::snapshot::{build_init_snapshot, build_spawn_snapshot};

/// Records one reference pass into a [`CapturedState`].
pub struct CaptureCollector {
    registry: SharedRegistry,
    state: CapturedState,
    identifiers: Rc<RefCell<Vec<String>>>,
    spawns: Rc<RefCell<BTreeMap<String, SpawnAssignment>>>,
    perf: PerfAccumulator,
}

struct RecordingIdentifierDecorator {
    log: Rc<RefCell<Vec<String>>>,
}

impl IdentifierDecorator for RecordingIdentifierDecorator {
    fn on_identifier(&mut self, generated: String) -> String {
        self.log.borrow_mut().push(generated.clone());
        generated
    }
}

struct RecordingSpawnDecorator {
    assignments: Rc<RefCell<BTreeMap<String, SpawnAssignment>>>,
}

impl SpawnDecorator for RecordingSpawnDecorator {
    fn on_spawn(&mut self, intent: SpawnIntent) -> SpawnIntent {
        self.assignments.borrow_mut().insert(
            intent.player_id.clone(),
            SpawnAssignment {
                player_id: intent.player_id.clone(),
                tile: intent.tile,
                coords: intent.coords,
                name: intent.name.clone(),
                kind: intent.kind.clone(),
            },
        );
        intent
    }
}

impl CaptureCollector {
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            state: CapturedState::default(),
            identifiers: Rc::new(RefCell::new(Vec::new())),
            spawns: Rc::new(RefCell::new(BTreeMap::new())),
            perf: PerfAccumulator::new(),
        }
    }

    /// Pass-through decorator that logs every generated identifier in
    /// event order.
    pub fn identifier_decorator(&self) -> Box<dyn IdentifierDecorator> {
        Box::new(RecordingIdentifierDecorator {
            log: Rc::clone(&self.identifiers),
        })
    }

    /// Pass-through decorator that records spawn placements, last write per
    /// player winning.
    pub fn spawn_decorator(&self) -> Box<dyn SpawnDecorator> {
        Box::new(RecordingSpawnDecorator {
            assignments: Rc::clone(&self.spawns),
        })
    }

    pub fn record_generated_identifier(&mut self, id: &str) {
        self.identifiers.borrow_mut().push(id.to_string());
    }

    pub fn record_spawn_assignment(&mut self, assignment: SpawnAssignment) {
        self.spawns
            .borrow_mut()
            .insert(assignment.player_id.clone(), assignment);
    }

    /// Snapshot every registered stream for `tick`. No-op past the spawn
    /// phase to bound capture volume.
    pub fn capture_random_streams_snapshot(&mut self, tick: u64) {
        if tick > SPAWN_PHASE_TICKS {
            return;
        }
        let snapshot: BTreeMap<_, _> = self
            .registry
            .borrow()
            .snapshot_all()
            .into_iter()
            .map(|(key, state)| (key.as_map_key(), state))
            .collect();
        self.state.stream_snapshots.insert(tick, snapshot);
    }

    pub fn capture_snapshot_at_init(&mut self, game: &dyn GameStateView, tick: u64) {
        match build_init_snapshot(game, tick) {
            Ok(snapshot) => self.state.init_snapshot = Some(snapshot),
            Err(err) => warn!("init snapshot capture failed, field left empty: {}", err),
        }
    }

    pub fn capture_snapshot_after_spawn_phase(&mut self, game: &dyn GameStateView, tick: u64) {
        if self.state.spawn_snapshot.is_some() {
            return;
        }
        match build_spawn_snapshot(game, tick) {
            Ok(snapshot) => self.state.spawn_snapshot = Some(snapshot),
            Err(err) => warn!(
                "spawn-phase snapshot capture failed, field left empty: {}",
                err
            ),
        }
    }

    fn capture_map_and_config(&mut self, game: &dyn GameStateView) {
        match game.terrain_hash() {
            Ok(hash) => self.state.terrain_hash = hash,
            Err(err) => warn!("terrain hash capture failed: {}", err),
        }
        match game.map_manifest() {
            Ok(manifest) => self.state.map_manifest = manifest,
            Err(err) => warn!("map manifest capture failed: {}", err),
        }
        match game.config_scalars() {
            Ok(config) => self.state.config = config,
            Err(err) => warn!("config capture failed: {}", err),
        }
    }

    /// Consume the collector, yielding the immutable captured artifact and
    /// the pass's performance report.
    pub fn finish(
        self,
        intent_counts: BTreeMap<String, u64>,
    ) -> (CapturedState, PerfReport) {
        let mut state = self.state;
        state.identifiers = self.identifiers.borrow().clone();
        state.spawn_assignments = self.spawns.borrow().clone();
        (state, self.perf.finish(intent_counts))
    }
}

impl RunObserver for CaptureCollector {
    fn on_initialized(&mut self, game: &dyn GameStateView, tick: u64) {
        self.capture_map_and_config(game);
        self.capture_snapshot_at_init(game, tick);
        self.capture_random_streams_snapshot(tick);
        self.perf.begin();
    }

    fn on_after_tick(
        &mut self,
        game: &dyn GameStateView,
        tick: u64,
        _changes: &[OwnershipChange],
        _is_last: bool,
    ) {
        match game.integrity_hash() {
            Ok(hash) => self.perf.note_tick(tick, hash),
            Err(err) => {
                warn!("integrity hash unavailable at tick {}: {}", tick, err);
                self.perf.note_tick_without_hash(tick);
            }
        }
        self.capture_random_streams_snapshot(tick);
        if tick == SPAWN_PHASE_TICKS {
            self.capture_snapshot_after_spawn_phase(game, tick);
        }
    }
}
