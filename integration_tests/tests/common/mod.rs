//! Deterministic toy engine driven through the comparison seams.
//!
//! Each "version" is an [`EngineBehavior`]: a set of knobs standing in for
//! the ways real checkouts diverge (identifier formats, terrain content,
//! player rosters, extra random draws). The simulation itself is a trivial
//! territory game on a 64x64 grid, deterministic for a fixed seed and
//! behavior.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Once;

use compare_core::engine::{
    EngineError, EngineProvider, EngineSession, GameStartDescriptor, GameStateView,
    IdentifierDecorator, OwnershipChange, PlayerInfo, ReplayIntent, ReplayTurn, RunObserver,
    SpawnDecorator, SpawnIntent, StateViewError, TurnSource, VersionSpec,
};
use compare_core::hashing::{hash_str, HashChain};
use compare_core::registry::SharedRegistry;
use compare_core::rng::GameRng;
use compare_schema::ConfigScalars;

pub const MAP_SIDE: u64 = 64;
pub const MAP_TILES: u64 = MAP_SIDE * MAP_SIDE;

static INIT: Once = Once::new();

/// Route tracing output through the test harness when RUST_LOG is set.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Version-dependent knobs of the toy engine.
#[derive(Debug, Clone)]
pub struct EngineBehavior {
    /// Prefix minted into every identifier; differing prefixes model an
    /// engine version that changed its identifier format.
    pub id_prefix: String,
    /// Folded into the terrain content hash; differing salts model a
    /// checkout that ships different map data.
    pub terrain_salt: u64,
    /// Drop the player at this roster slot, as a version that fails to
    /// spawn one participant would.
    pub skip_player: Option<usize>,
    /// Identifier-generation calls made beyond the roster.
    pub extra_id_draws: u32,
    /// World-stream draws consumed during setup after spawn placement.
    pub extra_init_draws: u32,
    pub player_count: usize,
    /// Ports exposed by this version; `false` models a historical build
    /// predating instrumentation.
    pub identifier_port: bool,
    pub spawn_port: bool,
    /// Overrides the bot count reported by the game config, modelling a
    /// version with different effective settings.
    pub bot_count_override: Option<u32>,
}

impl Default for EngineBehavior {
    fn default() -> Self {
        Self {
            id_prefix: String::new(),
            terrain_salt: 0,
            skip_player: None,
            extra_id_draws: 0,
            extra_init_draws: 0,
            player_count: 8,
            identifier_port: true,
            spawn_port: true,
            bot_count_override: None,
        }
    }
}

/// Maps version identifiers to behaviors, standing in for checkout.
#[derive(Default)]
pub struct ToyEngineProvider {
    behaviors: HashMap<String, EngineBehavior>,
}

impl ToyEngineProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: &str, behavior: EngineBehavior) -> Self {
        self.behaviors.insert(version.to_string(), behavior);
        self
    }
}

impl EngineProvider for ToyEngineProvider {
    fn prepare(&mut self, version: &VersionSpec) -> Result<Box<dyn EngineSession>, EngineError> {
        let behavior = self
            .behaviors
            .get(&version.to_string())
            .cloned()
            .ok_or_else(|| {
                EngineError::Preparation(format!("unknown toy engine version {version}"))
            })?;
        Ok(Box::new(ToyEngineSession {
            version: version.clone(),
            behavior,
            id_decorator: None,
            spawn_decorator: None,
        }))
    }
}

pub struct ToyEngineSession {
    version: VersionSpec,
    behavior: EngineBehavior,
    id_decorator: Option<Box<dyn IdentifierDecorator>>,
    spawn_decorator: Option<Box<dyn SpawnDecorator>>,
}

impl ToyEngineSession {
    fn decorate_id(&mut self, raw: String) -> String {
        match self.id_decorator.as_mut() {
            Some(decorator) => decorator.on_identifier(raw),
            None => raw,
        }
    }

    fn decorate_spawn(&mut self, intent: SpawnIntent) -> SpawnIntent {
        match self.spawn_decorator.as_mut() {
            Some(decorator) => decorator.on_spawn(intent),
            None => intent,
        }
    }
}

impl EngineSession for ToyEngineSession {
    fn version(&self) -> &VersionSpec {
        &self.version
    }

    fn install_identifier_decorator(&mut self, decorator: Box<dyn IdentifierDecorator>) -> bool {
        if !self.behavior.identifier_port {
            return false;
        }
        self.id_decorator = Some(decorator);
        true
    }

    fn install_spawn_decorator(&mut self, decorator: Box<dyn SpawnDecorator>) -> bool {
        if !self.behavior.spawn_port {
            return false;
        }
        self.spawn_decorator = Some(decorator);
        true
    }

    fn clear_decorators(&mut self) {
        self.id_decorator = None;
        self.spawn_decorator = None;
    }

    fn run(
        &mut self,
        start: &GameStartDescriptor,
        turns: &mut dyn TurnSource,
        registry: &SharedRegistry,
        observer: &mut dyn RunObserver,
    ) -> Result<(), EngineError> {
        let world_rng = Rc::new(RefCell::new(GameRng::new(hash_str(&start.game_id))));
        let id_rng = Rc::new(RefCell::new(GameRng::new(hash_str(&start.game_id))));
        {
            let mut registry = registry.borrow_mut();
            let world_seed = world_rng.borrow().seed();
            let id_seed = id_rng.borrow().seed();
            registry.register(world_seed, &world_rng);
            registry.register(id_seed, &id_rng);
        }

        let mut config = start.config.clone();
        if let Some(bots) = self.behavior.bot_count_override {
            config.bot_count = bots;
        }
        let mut game = ToyGame {
            players: Vec::new(),
            ownership: BTreeMap::new(),
            terrain_hash: {
                let mut chain = HashChain::new();
                chain
                    .push_str(&start.map_name)
                    .push_u64(self.behavior.terrain_salt);
                chain.finish()
            },
            manifest: vec!["plains".into(), "river".into(), "mountain".into()],
            config,
        };

        // Roster: every identifier draw goes through the port.
        for slot in 0..self.behavior.player_count {
            if self.behavior.skip_player == Some(slot) {
                // The draw still happens; the participant never joins.
                let _ = id_rng.borrow_mut().next_identifier();
                continue;
            }
            let raw = format!(
                "{}{}",
                self.behavior.id_prefix,
                id_rng.borrow_mut().next_identifier()
            );
            let id = self.decorate_id(raw);
            let kind = if slot == 0 { "human" } else { "bot" };
            game.players.push(PlayerInfo {
                id,
                name: format!("Player {slot}"),
                kind: kind.into(),
            });
        }
        for _ in 0..self.behavior.extra_id_draws {
            let raw = format!(
                "{}{}",
                self.behavior.id_prefix,
                id_rng.borrow_mut().next_identifier()
            );
            let _ = self.decorate_id(raw);
        }

        // Spawn placement through the spawn port.
        for player in game.players.clone() {
            let tile = world_rng.borrow_mut().gen_range(0, MAP_TILES);
            let intent = self.decorate_spawn(SpawnIntent {
                player_id: player.id.clone(),
                tile,
                coords: tile_coords(tile),
                name: player.name.clone(),
                kind: "spawn".into(),
            });
            game.ownership.insert(intent.tile, intent.player_id.clone());
            if let Some(entry) = game
                .players
                .iter_mut()
                .find(|entry| entry.id == intent.player_id)
            {
                entry.name = intent.name;
            }
        }

        // Setup-time draws some versions perform after placement.
        for _ in 0..self.behavior.extra_init_draws {
            let _ = world_rng.borrow_mut().next_u64();
        }

        observer.on_initialized(&game, 0);

        let mut pending = turns.next_turn();
        while let Some(turn) = pending {
            pending = turns.next_turn();
            let is_last = pending.is_none();

            let mut changes = Vec::new();
            for player in &game.players {
                let tile = world_rng.borrow_mut().gen_range(0, MAP_TILES);
                let previous = game.ownership.insert(tile, player.id.clone());
                changes.push(OwnershipChange {
                    tile,
                    previous,
                    owner: Some(player.id.clone()),
                });
            }
            observer.on_after_tick(&game, turn.turn_number, &changes, is_last);
        }
        Ok(())
    }
}

fn tile_coords(tile: u64) -> (u32, u32) {
    ((tile % MAP_SIDE) as u32, (tile / MAP_SIDE) as u32)
}

struct ToyGame {
    players: Vec<PlayerInfo>,
    ownership: BTreeMap<u64, String>,
    terrain_hash: u64,
    manifest: Vec<String>,
    config: ConfigScalars,
}

impl GameStateView for ToyGame {
    fn players(&self) -> Result<Vec<PlayerInfo>, StateViewError> {
        Ok(self.players.clone())
    }

    fn tiles_owned(&self, player_id: &str) -> Result<u64, StateViewError> {
        Ok(self
            .ownership
            .values()
            .filter(|owner| owner.as_str() == player_id)
            .count() as u64)
    }

    fn sampled_coords(
        &self,
        player_id: &str,
        limit: usize,
    ) -> Result<Vec<(u32, u32)>, StateViewError> {
        Ok(self
            .ownership
            .iter()
            .filter(|(_, owner)| owner.as_str() == player_id)
            .take(limit)
            .map(|(tile, _)| tile_coords(*tile))
            .collect())
    }

    fn integrity_hash(&self) -> Result<u64, StateViewError> {
        let mut chain = HashChain::new();
        for player in &self.players {
            chain.push_str(&player.id).push_str(&player.name);
        }
        for (tile, owner) in &self.ownership {
            chain.push_u64(*tile).push_str(owner);
        }
        Ok(chain.finish())
    }

    fn terrain_hash(&self) -> Result<u64, StateViewError> {
        Ok(self.terrain_hash)
    }

    fn map_manifest(&self) -> Result<Vec<String>, StateViewError> {
        Ok(self.manifest.clone())
    }

    fn config_scalars(&self) -> Result<ConfigScalars, StateViewError> {
        Ok(self.config.clone())
    }
}

/// In-memory replay feed, reopened identically for each pass.
pub struct ReplayFeed {
    turns: Vec<ReplayTurn>,
}

impl ReplayFeed {
    /// `ticks` turns, each carrying one `expand` intent per roster slot.
    pub fn recorded(ticks: u64, roster: usize) -> Self {
        let turns = (1..=ticks)
            .map(|number| ReplayTurn {
                turn_number: number,
                intents: (0..roster)
                    .map(|slot| ReplayIntent {
                        kind: "expand".into(),
                        payload: serde_json::json!({ "slot": slot }),
                    })
                    .collect(),
            })
            .collect();
        Self { turns }
    }
}

impl TurnSource for ReplayFeed {
    fn next_turn(&mut self) -> Option<ReplayTurn> {
        if self.turns.is_empty() {
            None
        } else {
            Some(self.turns.remove(0))
        }
    }
}

pub fn start_descriptor() -> GameStartDescriptor {
    GameStartDescriptor {
        game_id: "recorded-game-7".into(),
        map_name: "plains".into(),
        config: ConfigScalars {
            game_mode: "ffa".into(),
            map_name: "plains".into(),
            bot_count: 7,
            spawn_phase_turns: 30,
            disabled_units: 0,
        },
    }
}
