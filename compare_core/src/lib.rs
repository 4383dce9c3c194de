//! Deterministic state capture/injection core for A/B engine performance
//! comparison.
//!
//! One recorded game is run twice against two versions of a simulation
//! engine. A reference pass records every random decision — identifier
//! order, spawn placements, per-tick stream states through the spawn phase —
//! and a comparison pass re-imposes them without suppressing its own stream
//! consumption, so later draws stay synchronized and the measured
//! performance delta stays meaningful. [`ComparisonOrchestrator`] drives
//! both passes through the seams in [`engine`].
//!
//! Divergence is reported, never repaired: anything short of a simulation
//! failure becomes an [`compare_schema::InjectionWarning`] that qualifies
//! the result instead of aborting it.

pub mod capture;
pub mod engine;
pub mod hashing;
pub mod inject;
pub mod orchestrate;
pub mod registry;
pub mod report;
pub mod rng;
pub mod snapshot;

pub use capture::CaptureCollector;
pub use engine::{
    EngineError, EngineProvider, EngineSession, GameStartDescriptor, GameStateView,
    IdentifierDecorator, OwnershipChange, PlayerInfo, ReplayIntent, ReplayTurn, RunObserver,
    SpawnDecorator, SpawnIntent, StateViewError, TurnSource, VersionSpec,
};
pub use inject::InjectionEnforcer;
pub use orchestrate::{CompareError, ComparisonOrchestrator, ComparisonRequest};
pub use registry::{shared_registry, RandomStreamHandle, SharedRegistry, StreamRegistry};
pub use rng::{GameRng, StreamStateError};
