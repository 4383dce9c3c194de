//! Seams between the comparison core and its collaborators.
//!
//! The core never patches engine internals. The engine-loading layer exposes
//! two interception ports (identifier generation and spawn scheduling) as
//! decorator slots, a run primitive with two observer callbacks, and a
//! read-only game-state view. Everything the orchestrator drives goes
//! through these traits, so the core depends on a stable boundary rather
//! than engine method names.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use compare_schema::ConfigScalars;

use crate::registry::SharedRegistry;

/// Identity of a prepared engine checkout: a release tag or a commit hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Tag { major: u32, minor: u32, patch: u32 },
    Commit(String),
}

/// A version identifier that is neither a `vX.Y.Z` tag nor a hex commit id.
/// Always fatal: a comparison against an unidentifiable checkout is
/// meaningless.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct VersionParseError(String);

impl VersionSpec {
    /// Parse `v1.2.3` release tags and 7-40 character hex commit ids.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError("empty version identifier".into()));
        }
        if let Some(rest) = trimmed.strip_prefix('v') {
            let mut parts = rest.split('.');
            let tag = (|| {
                let major = parts.next()?.parse().ok()?;
                let minor = parts.next()?.parse().ok()?;
                let patch = parts.next()?.parse().ok()?;
                if parts.next().is_some() {
                    return None;
                }
                Some(VersionSpec::Tag {
                    major,
                    minor,
                    patch,
                })
            })();
            return tag.ok_or_else(|| {
                VersionParseError(format!("malformed release tag {trimmed:?}"))
            });
        }
        let is_hex = trimmed.chars().all(|c| c.is_ascii_hexdigit());
        if is_hex && (7..=40).contains(&trimmed.len()) {
            return Ok(Self::Commit(trimmed.to_ascii_lowercase()));
        }
        Err(VersionParseError(format!(
            "{trimmed:?} is neither a release tag nor a commit hash"
        )))
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag {
                major,
                minor,
                patch,
            } => write!(f, "v{major}.{minor}.{patch}"),
            Self::Commit(hash) => f.write_str(hash),
        }
    }
}

/// Failure produced by engine collaborators. Preparation and run failures
/// are always fatal to the comparison.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine preparation failed: {0}")]
    Preparation(String),
    #[error("simulation run failed: {0}")]
    Run(String),
}

/// Failure to read an observable from live game state. Callers downgrade
/// these to warnings; a snapshot that cannot be built is left empty.
#[derive(Debug, Error)]
#[error("game state unavailable: {0}")]
pub struct StateViewError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
    pub kind: String,
}

/// Read-only view of live game state, handed to observer callbacks.
pub trait GameStateView {
    fn players(&self) -> Result<Vec<PlayerInfo>, StateViewError>;
    fn tiles_owned(&self, player_id: &str) -> Result<u64, StateViewError>;
    /// Up to `limit` owned coordinates, in the engine's iteration order.
    fn sampled_coords(
        &self,
        player_id: &str,
        limit: usize,
    ) -> Result<Vec<(u32, u32)>, StateViewError>;
    /// Scalar computed from full simulation state; the cheap equality
    /// oracle between the two passes at a given tick.
    fn integrity_hash(&self) -> Result<u64, StateViewError>;
    fn terrain_hash(&self) -> Result<u64, StateViewError>;
    fn map_manifest(&self) -> Result<Vec<String>, StateViewError>;
    fn config_scalars(&self) -> Result<ConfigScalars, StateViewError>;
}

/// A spawn-type execution about to be scheduled by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnIntent {
    pub player_id: String,
    pub tile: u64,
    pub coords: (u32, u32),
    pub name: String,
    pub kind: String,
}

/// One tile changing owner during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipChange {
    pub tile: u64,
    pub previous: Option<String>,
    pub owner: Option<String>,
}

/// Identifier-generation port. The engine invokes the decorator *after*
/// drawing from its stream, so decoration can never skip stream consumption.
pub trait IdentifierDecorator {
    fn on_identifier(&mut self, generated: String) -> String;
}

/// Spawn-scheduling port. The decorator sees each spawn intent before the
/// engine executes it and may rewrite the placement.
pub trait SpawnDecorator {
    fn on_spawn(&mut self, intent: SpawnIntent) -> SpawnIntent;
}

/// One intent from the replay log. The payload is opaque to the core.
#[derive(Debug, Clone)]
pub struct ReplayIntent {
    pub kind: String,
    pub payload: Value,
}

/// One turn of the recorded replay.
#[derive(Debug, Clone)]
pub struct ReplayTurn {
    pub turn_number: u64,
    pub intents: Vec<ReplayIntent>,
}

/// Feed of replay turns, opened fresh for each pass.
pub trait TurnSource {
    fn next_turn(&mut self) -> Option<ReplayTurn>;
}

/// Callbacks the run primitive fires into the core.
pub trait RunObserver {
    /// Fires once, immediately after setup completes and before any tick.
    fn on_initialized(&mut self, game: &dyn GameStateView, tick: u64);

    /// Fires once per tick with that tick's ownership changes.
    fn on_after_tick(
        &mut self,
        game: &dyn GameStateView,
        tick: u64,
        changes: &[OwnershipChange],
        is_last: bool,
    );
}

/// Descriptor the run primitive starts a game from.
#[derive(Debug, Clone)]
pub struct GameStartDescriptor {
    pub game_id: String,
    pub map_name: String,
    pub config: ConfigScalars,
}

/// One prepared engine version, alive for a single pass.
///
/// Installation returns `false` when the engine predates the port; the
/// feature then degrades silently, keeping the harness usable against
/// historical versions. [`EngineSession::clear_decorators`] is the single
/// cleanup operation and must be idempotent.
pub trait EngineSession {
    fn version(&self) -> &VersionSpec;

    fn install_identifier_decorator(&mut self, decorator: Box<dyn IdentifierDecorator>) -> bool;

    fn install_spawn_decorator(&mut self, decorator: Box<dyn SpawnDecorator>) -> bool;

    /// Remove every installed decorator, restoring the undecorated engine.
    fn clear_decorators(&mut self);

    /// Execute the full simulation over `turns`. Streams the engine creates
    /// must be registered in `registry` at construction.
    fn run(
        &mut self,
        start: &GameStartDescriptor,
        turns: &mut dyn TurnSource,
        registry: &SharedRegistry,
        observer: &mut dyn RunObserver,
    ) -> Result<(), EngineError>;
}

/// Version retrieval/checkout collaborator.
pub trait EngineProvider {
    fn prepare(&mut self, version: &VersionSpec) -> Result<Box<dyn EngineSession>, EngineError>;
}
