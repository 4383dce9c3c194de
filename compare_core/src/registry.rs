//! Registration context for engine-owned random streams.
//!
//! The registry is an explicit object owned by the orchestrator and passed
//! into the engine entry point, never a process-wide singleton. Streams
//! register on construction and receive a zero-based creation-order index
//! among streams sharing their seed, which is deterministic for a
//! deterministic engine. Resetting between passes restarts those indices so
//! no handle from one engine version leaks into the next.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::warn;

use compare_schema::{StreamKey, StreamState};

use crate::rng::{GameRng, StreamStateError};

/// Non-owning handle to an engine-owned random stream.
///
/// The engine keeps the `Rc`; the handle holds a `Weak` so stream lifetime
/// stays bound to the run that created it.
#[derive(Debug, Clone)]
pub struct RandomStreamHandle {
    key: StreamKey,
    rng: Weak<RefCell<GameRng>>,
}

impl RandomStreamHandle {
    pub fn key(&self) -> StreamKey {
        self.key
    }

    /// Export the stream's current state.
    pub fn get_state(&self) -> Result<StreamState, StreamStateError> {
        let rng = self.rng.upgrade().ok_or(StreamStateError::Dropped)?;
        let state = rng.borrow().export_state()?;
        Ok(state)
    }

    /// Replace the stream's state in place.
    pub fn set_state(&self, state: &StreamState) -> Result<(), StreamStateError> {
        let rng = self.rng.upgrade().ok_or(StreamStateError::Dropped)?;
        let result = rng.borrow_mut().import_state(state);
        result
    }
}

/// Registry of every random stream the current run has constructed.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    handles: Vec<RandomStreamHandle>,
    next_index: HashMap<u64, u32>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine-owned stream, returning its creation-order index
    /// among streams sharing `seed`.
    pub fn register(&mut self, seed: u64, rng: &Rc<RefCell<GameRng>>) -> u32 {
        let entry = self.next_index.entry(seed).or_insert(0);
        let index = *entry;
        *entry += 1;
        self.handles.push(RandomStreamHandle {
            key: StreamKey::new(seed, index),
            rng: Rc::downgrade(rng),
        });
        index
    }

    pub fn handles(&self) -> &[RandomStreamHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Export the state of every live stream. Streams whose owner already
    /// dropped them are skipped with a log line.
    pub fn snapshot_all(&self) -> Vec<(StreamKey, StreamState)> {
        self.handles
            .iter()
            .filter_map(|handle| match handle.get_state() {
                Ok(state) => Some((handle.key(), state)),
                Err(err) => {
                    warn!("skipping snapshot of stream {}: {}", handle.key(), err);
                    None
                }
            })
            .collect()
    }

    /// Restore a captured state into the registered stream for `key`.
    pub fn restore(&self, key: StreamKey, state: &StreamState) -> Result<(), StreamStateError> {
        let handle = self
            .handles
            .iter()
            .find(|handle| handle.key() == key)
            .ok_or(StreamStateError::Unregistered(key))?;
        handle.set_state(state)
    }

    /// Clear all registrations. Required between passes and between
    /// independent comparison invocations.
    pub fn reset(&mut self) {
        self.handles.clear();
        self.next_index.clear();
    }
}

/// Single-threaded shared registry the orchestrator threads through a run.
pub type SharedRegistry = Rc<RefCell<StreamRegistry>>;

pub fn shared_registry() -> SharedRegistry {
    Rc::new(RefCell::new(StreamRegistry::new()))
}
