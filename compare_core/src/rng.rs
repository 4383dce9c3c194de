//! Deterministic random streams with exportable state.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use compare_schema::{StreamKey, StreamState};

/// Failure to move state between a live stream and a captured snapshot.
///
/// These surface as injection warnings, never as fatal errors: a stream that
/// cannot be restored degrades synchronization, not the run itself.
#[derive(Debug, Error)]
pub enum StreamStateError {
    #[error("stream state export failed: {0}")]
    Export(String),
    #[error("stream state import failed: {0}")]
    Import(String),
    #[error("stream was dropped by its owning run")]
    Dropped,
    #[error("no registered stream for {0}")]
    Unregistered(StreamKey),
}

/// Engine-facing deterministic random stream.
///
/// Backed by ChaCha8 rather than `SmallRng`: its output and serialized state
/// are stable across platforms, which the opaque-stream-state contract
/// requires. The engine owns instances; the harness only ever holds
/// non-owning handles through the registry.
#[derive(Debug, Clone)]
pub struct GameRng {
    seed: u64,
    inner: ChaCha8Rng,
}

impl GameRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Draw a value in `[lo, hi_exclusive)`.
    pub fn gen_range(&mut self, lo: u64, hi_exclusive: u64) -> u64 {
        debug_assert!(lo < hi_exclusive);
        self.inner.gen_range(lo..hi_exclusive)
    }

    /// Mint an 8-character base-36 identifier from a single draw.
    ///
    /// One call consumes exactly one `next_u64`, so identifier generation
    /// advances the stream the same amount in every engine version that
    /// keeps this draw shape.
    pub fn next_identifier(&mut self) -> String {
        const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut value = self.next_u64();
        let mut out = String::with_capacity(8);
        for _ in 0..8 {
            out.push(ALPHABET[(value % 36) as usize] as char);
            value /= 36;
        }
        out
    }

    /// Serialize the generator state into an opaque snapshot.
    pub fn export_state(&self) -> Result<StreamState, StreamStateError> {
        bincode::serialize(&self.inner)
            .map(StreamState)
            .map_err(|err| StreamStateError::Export(err.to_string()))
    }

    /// Replace the generator state in place from a snapshot.
    pub fn import_state(&mut self, state: &StreamState) -> Result<(), StreamStateError> {
        let inner: ChaCha8Rng = bincode::deserialize(&state.0)
            .map_err(|err| StreamStateError::Import(err.to_string()))?;
        self.inner = inner;
        Ok(())
    }
}
