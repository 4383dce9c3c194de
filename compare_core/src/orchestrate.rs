//! Sequential driver for the reference and comparison passes.
//!
//! The orchestrator owns the stream registry, resets it before each pass,
//! installs and removes decorators around every run, and folds both
//! performance reports plus the injection warning list into one result.
//! Failures inside the simulation itself are fatal; failures inside
//! capture, injection, or validation never are.

use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

use compare_schema::{CapturedState, ComparisonReport, InjectionWarning, PerfReport};

use crate::capture::CaptureCollector;
use crate::engine::{
    EngineError, EngineProvider, EngineSession, GameStartDescriptor, TurnSource,
    VersionParseError, VersionSpec,
};
use crate::inject::InjectionEnforcer;
use crate::registry::{shared_registry, SharedRegistry};
use crate::report::CountingTurnSource;

/// Fatal comparison failures. Everything softer ends up in the warning list
/// of the returned report instead.
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("invalid engine version {input:?}: {source}")]
    InvalidVersion {
        input: String,
        #[source]
        source: VersionParseError,
    },
    #[error("failed to prepare engine {version}: {source}")]
    Preparation {
        version: String,
        #[source]
        source: EngineError,
    },
    #[error("reference run failed: {0}")]
    ReferenceRun(#[source] EngineError),
    #[error("comparison run failed: {0}")]
    ComparisonRun(#[source] EngineError),
}

/// What to compare: two engine versions over one recorded game.
#[derive(Debug, Clone)]
pub struct ComparisonRequest {
    pub reference_version: String,
    pub comparison_version: String,
    pub start: GameStartDescriptor,
}

/// Drives reference capture then comparison injection, strictly in that
/// order; injection structurally depends on the completed capture.
pub struct ComparisonOrchestrator {
    registry: SharedRegistry,
}

impl Default for ComparisonOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ComparisonOrchestrator {
    pub fn new() -> Self {
        Self {
            registry: shared_registry(),
        }
    }

    /// The registry threaded through both passes. Exposed so callers can
    /// hand it to engine code constructed outside [`EngineSession::run`].
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Run the full comparison. `open_turns` is called once per pass so both
    /// replay the same recorded input from the start.
    pub fn run<F>(
        &mut self,
        provider: &mut dyn EngineProvider,
        request: &ComparisonRequest,
        mut open_turns: F,
    ) -> Result<ComparisonReport, CompareError>
    where
        F: FnMut() -> Box<dyn TurnSource>,
    {
        let reference_version = parse_version(&request.reference_version)?;
        let comparison_version = parse_version(&request.comparison_version)?;

        info!("reference pass starting against {}", reference_version);
        let mut session = prepare(provider, &reference_version)?;
        let mut turns = open_turns();
        let (captured, reference_report) =
            self.run_reference_pass(session.as_mut(), &request.start, turns.as_mut())?;
        info!(
            "reference pass complete: {} identifiers, {} stream snapshots, {} ticks",
            captured.identifiers.len(),
            captured.stream_snapshots.len(),
            reference_report.ticks
        );

        info!("comparison pass starting against {}", comparison_version);
        let mut session = prepare(provider, &comparison_version)?;
        let mut turns = open_turns();
        let (warnings, comparison_report) =
            self.run_comparison_pass(session.as_mut(), &request.start, turns.as_mut(), captured)?;
        info!(
            "comparison pass complete: {} ticks, {} warnings",
            comparison_report.ticks,
            warnings.len()
        );

        Ok(ComparisonReport::from_passes(
            reference_report,
            comparison_report,
            warnings,
        ))
    }

    fn run_reference_pass(
        &mut self,
        session: &mut dyn EngineSession,
        start: &GameStartDescriptor,
        turns: &mut dyn TurnSource,
    ) -> Result<(CapturedState, PerfReport), CompareError> {
        self.registry.borrow_mut().reset();
        let mut collector = CaptureCollector::new(Rc::clone(&self.registry));

        if !session.install_identifier_decorator(collector.identifier_decorator()) {
            debug!("engine exposes no identifier port; identifier capture disabled");
        }
        if !session.install_spawn_decorator(collector.spawn_decorator()) {
            debug!("engine exposes no spawn port; spawn capture disabled");
        }

        let mut counted = CountingTurnSource::new(turns);
        let result = session.run(start, &mut counted, &self.registry, &mut collector);
        // Cleanup runs exactly once, before the error (if any) propagates.
        session.clear_decorators();
        result.map_err(CompareError::ReferenceRun)?;

        Ok(collector.finish(counted.into_counts()))
    }

    fn run_comparison_pass(
        &mut self,
        session: &mut dyn EngineSession,
        start: &GameStartDescriptor,
        turns: &mut dyn TurnSource,
        captured: CapturedState,
    ) -> Result<(Vec<InjectionWarning>, PerfReport), CompareError> {
        self.registry.borrow_mut().reset();
        let mut enforcer = InjectionEnforcer::new(Rc::clone(&self.registry), captured);

        if !session.install_identifier_decorator(enforcer.identifier_decorator()) {
            debug!("engine exposes no identifier port; identifier injection disabled");
        }
        if !session.install_spawn_decorator(enforcer.spawn_decorator()) {
            debug!("engine exposes no spawn port; spawn injection disabled");
        }

        let mut counted = CountingTurnSource::new(turns);
        let result = session.run(start, &mut counted, &self.registry, &mut enforcer);
        session.clear_decorators();
        result.map_err(CompareError::ComparisonRun)?;

        Ok(enforcer.finish(counted.into_counts()))
    }
}

fn parse_version(input: &str) -> Result<VersionSpec, CompareError> {
    VersionSpec::parse(input).map_err(|source| CompareError::InvalidVersion {
        input: input.to_string(),
        source,
    })
}

fn prepare(
    provider: &mut dyn EngineProvider,
    version: &VersionSpec,
) -> Result<Box<dyn EngineSession>, CompareError> {
    provider
        .prepare(version)
        .map_err(|source| CompareError::Preparation {
            version: version.to_string(),
            source,
        })
}
