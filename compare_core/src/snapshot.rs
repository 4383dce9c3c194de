//! Validation-snapshot builders shared by capture and injection.
//!
//! Both passes reduce live game state to the same observables, so the
//! injection pass can diff what it sees against what the reference recorded
//! field by field.

use std::collections::BTreeMap;

use compare_schema::{InitSnapshot, PlayerFootprint, SpawnPhaseSnapshot, COORD_SAMPLE_LIMIT};

use crate::engine::{GameStateView, StateViewError};

/// Player count, identifier set, and integrity hash at tick 0.
pub fn build_init_snapshot(
    game: &dyn GameStateView,
    tick: u64,
) -> Result<InitSnapshot, StateViewError> {
    let players = game.players()?;
    Ok(InitSnapshot {
        tick,
        player_count: players.len() as u32,
        player_ids: players.into_iter().map(|player| player.id).collect(),
        integrity_hash: game.integrity_hash()?,
    })
}

/// Per-player footprints and integrity hash at the spawn-phase boundary.
pub fn build_spawn_snapshot(
    game: &dyn GameStateView,
    tick: u64,
) -> Result<SpawnPhaseSnapshot, StateViewError> {
    let mut players = BTreeMap::new();
    for info in game.players()? {
        let tiles_owned = game.tiles_owned(&info.id)?;
        let sampled_coords = game.sampled_coords(&info.id, COORD_SAMPLE_LIMIT)?;
        players.insert(
            info.id.clone(),
            PlayerFootprint {
                id: info.id,
                name: info.name,
                kind: info.kind,
                tiles_owned,
                sampled_coords,
            },
        );
    }
    Ok(SpawnPhaseSnapshot {
        tick,
        players,
        integrity_hash: game.integrity_hash()?,
    })
}
