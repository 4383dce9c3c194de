//! Comparison-pass enforcement.
//!
//! The enforcer re-imposes a reference run's random decisions on a
//! comparison run without suppressing the comparison's own draws: the
//! engine always consumes its stream first, then the decorator substitutes
//! the captured value. Stream states are re-anchored at every captured tick
//! boundary rather than trusted to stay aligned, and both validation
//! snapshots are diffed field by field. Every mismatch becomes a warning;
//! nothing in this module can abort the run.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use tracing::{debug, warn};

use compare_schema::{
    CapturedState, InjectionWarning, PerfReport, SpawnAssignment, StreamKey, WarningKind,
    SPAWN_PHASE_TICKS,
};

use crate::engine::{
    GameStateView, IdentifierDecorator, OwnershipChange, RunObserver, SpawnDecorator, SpawnIntent,
};
use crate::registry::SharedRegistry;
use crate::report::PerfAccumulator;
use crate::snapshot::{build_init_snapshot, build_spawn_snapshot};

struct IdentifierReplay {
    queue: VecDeque<String>,
    overflow_warned: bool,
}

struct ReplayIdentifierDecorator {
    replay: Rc<RefCell<IdentifierReplay>>,
    warnings: Rc<RefCell<Vec<InjectionWarning>>>,
}

impl IdentifierDecorator for ReplayIdentifierDecorator {
    fn on_identifier(&mut self, generated: String) -> String {
        let mut replay = self.replay.borrow_mut();
        if let Some(captured) = replay.queue.pop_front() {
            return captured;
        }
        // One warning per run, however many extra identifiers follow.
        if !replay.overflow_warned {
            replay.overflow_warned = true;
            self.warnings.borrow_mut().push(InjectionWarning::new(
                WarningKind::ExtraIdentifiers,
                "comparison run generated more identifiers than the reference captured; \
                 falling back to freshly generated values",
            ));
        }
        generated
    }
}

struct SpawnOverrideDecorator {
    assignments: Rc<BTreeMap<String, SpawnAssignment>>,
}

impl SpawnDecorator for SpawnOverrideDecorator {
    fn on_spawn(&mut self, mut intent: SpawnIntent) -> SpawnIntent {
        if let Some(assignment) = self.assignments.get(&intent.player_id) {
            intent.tile = assignment.tile;
            intent.coords = assignment.coords;
            intent.name = assignment.name.clone();
        }
        intent
    }
}

/// Forces a comparison run to follow a [`CapturedState`].
pub struct InjectionEnforcer {
    registry: SharedRegistry,
    captured: CapturedState,
    warnings: Rc<RefCell<Vec<InjectionWarning>>>,
    replay: Rc<RefCell<IdentifierReplay>>,
    spawn_overrides: Rc<BTreeMap<String, SpawnAssignment>>,
    perf: PerfAccumulator,
}

impl InjectionEnforcer {
    pub fn new(registry: SharedRegistry, captured: CapturedState) -> Self {
        let replay = Rc::new(RefCell::new(IdentifierReplay {
            queue: captured.identifiers.iter().cloned().collect(),
            overflow_warned: false,
        }));
        let spawn_overrides = Rc::new(captured.spawn_assignments.clone());
        Self {
            registry,
            captured,
            warnings: Rc::new(RefCell::new(Vec::new())),
            replay,
            spawn_overrides,
            perf: PerfAccumulator::new(),
        }
    }

    /// Decorator replaying the captured identifier sequence. The generated
    /// value it receives proves the underlying stream already advanced.
    pub fn identifier_decorator(&self) -> Box<dyn IdentifierDecorator> {
        Box::new(ReplayIdentifierDecorator {
            replay: Rc::clone(&self.replay),
            warnings: Rc::clone(&self.warnings),
        })
    }

    /// Decorator pinning mapped players to their captured spawn placement.
    /// Players absent from the captured map pass through untouched.
    pub fn spawn_decorator(&self) -> Box<dyn SpawnDecorator> {
        Box::new(SpawnOverrideDecorator {
            assignments: Rc::clone(&self.spawn_overrides),
        })
    }

    fn warn(&self, kind: WarningKind, message: String) {
        warn!("{}", message);
        self.warnings
            .borrow_mut()
            .push(InjectionWarning::new(kind, message));
    }

    /// Re-anchor every stream captured at `tick` to its reference state.
    pub fn restore_random_streams_snapshot(&self, tick: u64) {
        let Some(snapshot) = self.captured.stream_snapshots.get(&tick) else {
            return;
        };
        let registry = self.registry.borrow();
        for (raw_key, state) in snapshot {
            let Some(key) = StreamKey::parse_map_key(raw_key) else {
                self.warn(
                    WarningKind::StreamRestore,
                    format!("unparseable stream key {raw_key:?} in captured state"),
                );
                continue;
            };
            if let Err(err) = registry.restore(key, state) {
                self.warn(
                    WarningKind::StreamRestore,
                    format!("failed to restore stream {key} at tick {tick}: {err}"),
                );
            }
        }
        debug!("restored {} stream states at tick {}", snapshot.len(), tick);
    }

    pub fn validate_snapshot_at_init(&self, game: &dyn GameStateView, tick: u64) {
        let Some(expected) = self.captured.init_snapshot.clone() else {
            self.warn(
                WarningKind::MissingSnapshot,
                "no captured init snapshot to validate against".into(),
            );
            return;
        };
        let actual = match build_init_snapshot(game, tick) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.warn(
                    WarningKind::SnapshotRebuild,
                    format!("init validation skipped, game state unreadable: {err}"),
                );
                return;
            }
        };

        if actual.player_count != expected.player_count {
            self.warn(
                WarningKind::PlayerCountMismatch,
                format!(
                    "player count at tick {tick}: reference {}, comparison {}",
                    expected.player_count, actual.player_count
                ),
            );
        }
        for id in expected.player_ids.difference(&actual.player_ids) {
            self.warn(
                WarningKind::MissingPlayer,
                format!("player {id} present in reference but missing at tick {tick}"),
            );
        }
        for id in actual.player_ids.difference(&expected.player_ids) {
            self.warn(
                WarningKind::ExtraPlayer,
                format!("player {id} absent from reference but present at tick {tick}"),
            );
        }
        if actual.integrity_hash != expected.integrity_hash {
            self.warn(
                WarningKind::HashMismatch,
                format!(
                    "integrity hash mismatch at tick {tick}: reference {:#018x}, comparison {:#018x}",
                    expected.integrity_hash, actual.integrity_hash
                ),
            );
        }
    }

    pub fn validate_snapshot_after_spawn_phase(&self, game: &dyn GameStateView, tick: u64) {
        let Some(expected) = self.captured.spawn_snapshot.clone() else {
            self.warn(
                WarningKind::MissingSnapshot,
                "no captured spawn-phase snapshot to validate against".into(),
            );
            return;
        };
        let actual = match build_spawn_snapshot(game, tick) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.warn(
                    WarningKind::SnapshotRebuild,
                    format!("spawn-phase validation skipped, game state unreadable: {err}"),
                );
                return;
            }
        };

        for (id, reference) in &expected.players {
            match actual.players.get(id) {
                None => self.warn(
                    WarningKind::MissingPlayer,
                    format!(
                        "player {id} ({}) present in reference but missing at tick {tick}",
                        reference.name
                    ),
                ),
                Some(comparison) => {
                    if comparison.tiles_owned != reference.tiles_owned {
                        self.warn(
                            WarningKind::TileCountMismatch,
                            format!(
                                "player {id} owns {} tiles at tick {tick}, reference owned {}",
                                comparison.tiles_owned, reference.tiles_owned
                            ),
                        );
                    }
                }
            }
        }
        for id in actual.players.keys() {
            if !expected.players.contains_key(id) {
                self.warn(
                    WarningKind::ExtraPlayer,
                    format!("player {id} absent from reference but present at tick {tick}"),
                );
            }
        }
        if actual.integrity_hash != expected.integrity_hash {
            self.warn(
                WarningKind::HashMismatch,
                format!(
                    "integrity hash mismatch at tick {tick}: reference {:#018x}, comparison {:#018x}",
                    expected.integrity_hash, actual.integrity_hash
                ),
            );
        }
    }

    /// Diff terrain hash, map manifest, and config scalars against the
    /// captured values. Divergence here means the checkouts loaded different
    /// content; informative, never blocking.
    pub fn validate_map_and_config(&self, game: &dyn GameStateView) {
        match game.terrain_hash() {
            Ok(hash) if hash != self.captured.terrain_hash => self.warn(
                WarningKind::TerrainHashMismatch,
                format!(
                    "terrain hash mismatch: reference {:#018x}, comparison {hash:#018x}",
                    self.captured.terrain_hash
                ),
            ),
            Ok(_) => {}
            Err(err) => self.warn(
                WarningKind::SnapshotRebuild,
                format!("terrain hash unavailable: {err}"),
            ),
        }
        match game.map_manifest() {
            Ok(manifest) if manifest != self.captured.map_manifest => self.warn(
                WarningKind::ManifestMismatch,
                format!(
                    "map manifest mismatch: reference {:?}, comparison {:?}",
                    self.captured.map_manifest, manifest
                ),
            ),
            Ok(_) => {}
            Err(err) => self.warn(
                WarningKind::SnapshotRebuild,
                format!("map manifest unavailable: {err}"),
            ),
        }
        match game.config_scalars() {
            Ok(config) if config != self.captured.config => self.warn(
                WarningKind::ConfigMismatch,
                format!(
                    "config scalars mismatch: reference {:?}, comparison {:?}",
                    self.captured.config, config
                ),
            ),
            Ok(_) => {}
            Err(err) => self.warn(
                WarningKind::SnapshotRebuild,
                format!("config scalars unavailable: {err}"),
            ),
        }
    }

    /// Consume the enforcer, yielding every warning plus the pass's
    /// performance report.
    pub fn finish(
        self,
        intent_counts: BTreeMap<String, u64>,
    ) -> (Vec<InjectionWarning>, PerfReport) {
        {
            let replay = self.replay.borrow();
            if !replay.queue.is_empty() {
                self.warn(
                    WarningKind::UnusedIdentifiers,
                    format!(
                        "{} captured identifiers were never requested by the comparison run",
                        replay.queue.len()
                    ),
                );
            }
        }
        let warnings = self.warnings.borrow().clone();
        (warnings, self.perf.finish(intent_counts))
    }
}

impl RunObserver for InjectionEnforcer {
    fn on_initialized(&mut self, game: &dyn GameStateView, tick: u64) {
        self.validate_map_and_config(game);
        self.restore_random_streams_snapshot(tick);
        self.validate_snapshot_at_init(game, tick);
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
        self.restore_random_streams_snapshot(tick);
        if tick == SPAWN_PHASE_TICKS {
            self.validate_snapshot_after_spawn_phase(game, tick);
        }
    }
}
