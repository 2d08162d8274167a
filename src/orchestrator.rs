//! Repository validator orchestration (spec.md §4.7 J): the
//! MarkerCheck→Structure→Manifest→Content→Consistency state machine, run
//! either strictly sequentially or with the four post-marker phases
//! bounded-parallel under a semaphore, with cancellation, timeout, early
//! termination, and per-phase metrics.
//!
//! A worker-pool-with-a-semaphore shape, generalized from a fixed
//! queue of file operations into four independent, order-agnostic
//! validation phases.
//!
//! Early termination is a genuine short-circuit in sequential mode: a
//! qualifying violation stops the loop before any later phase is even
//! spawned. In parallel mode every phase is already running concurrently
//! by the time one of them reports a trigger, so the best the orchestrator
//! can do is `abort()` the handles it hasn't awaited yet — it stops
//! collecting further results, not work already in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::marker::MarkerValidation;
use crate::report::{Report, Violation, ViolationType};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel { max_concurrency: usize },
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Sequential
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Structure,
    Manifest,
    Content,
    Consistency,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Structure => "structure",
            Phase::Manifest => "manifest",
            Phase::Content => "content",
            Phase::Consistency => "consistency",
        }
    }
}

const PHASES_IN_ORDER: [Phase; 4] = [Phase::Structure, Phase::Manifest, Phase::Content, Phase::Consistency];

pub type PhaseFn = Arc<dyn Fn() -> Vec<Violation> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("validation cancelled")]
    Cancelled,
    #[error("validation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("early termination: {violation_file} ({violation_type:?})")]
    EarlyTermination {
        violation_file: String,
        violation_type: ViolationType,
        partial_report: Report,
    },
}

/// Cooperative cancellation signal, checked before each phase and inside
/// the parallel collection loop (spec.md §5).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    phase_durations: Mutex<HashMap<&'static str, Duration>>,
    total_duration: Mutex<Option<Duration>>,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub phase_durations: HashMap<&'static str, Duration>,
    pub total_duration: Option<Duration>,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            phase_durations: self.phase_durations.lock().expect("metrics lock").clone(),
            total_duration: *self.total_duration.lock().expect("metrics lock"),
        }
    }

    fn record_phase(&self, phase: Phase, duration: Duration) {
        self.phase_durations
            .lock()
            .expect("metrics lock")
            .insert(phase.label(), duration);
    }

    fn record_total(&self, duration: Duration) {
        *self.total_duration.lock().expect("metrics lock") = Some(duration);
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub mode: ExecutionMode,
    pub timeout: Option<Duration>,
    pub early_termination: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            mode: ExecutionMode::Sequential,
            timeout: None,
            early_termination: false,
        }
    }
}

/// Orchestrates a full repository validation run per spec.md §4.7 J.
pub struct RepositoryValidator {
    config: OrchestratorConfig,
    pub metrics: Metrics,
}

impl RepositoryValidator {
    pub fn new(config: OrchestratorConfig) -> Self {
        RepositoryValidator {
            config,
            metrics: Metrics::default(),
        }
    }

    /// Runs MarkerCheck, then (unless the version is unsupported) the
    /// four phases, sequentially or bounded-parallel per configuration.
    pub async fn validate(
        &self,
        marker_check: impl Fn() -> MarkerValidation + Send + Sync,
        phases: HashMap<Phase, PhaseFn>,
        cancel: &CancellationToken,
    ) -> Result<Report, OrchestratorError> {
        let run = self.validate_inner(marker_check, phases, cancel);
        let start = Instant::now();

        let result = if let Some(timeout) = self.config.timeout {
            match tokio::time::timeout(timeout, run).await {
                Ok(result) => result,
                Err(_) => return Err(OrchestratorError::TimedOut(timeout)),
            }
        } else {
            run.await
        };

        self.metrics.record_total(start.elapsed());
        result
    }

    async fn validate_inner(
        &self,
        marker_check: impl Fn() -> MarkerValidation + Send + Sync,
        phases: HashMap<Phase, PhaseFn>,
        cancel: &CancellationToken,
    ) -> Result<Report, OrchestratorError> {
        let mut report = Report::new();

        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let marker_result = marker_check();
        report.extend(marker_result.violations);
        if !marker_result.version_supported {
            return Ok(report);
        }

        match self.config.mode {
            ExecutionMode::Sequential => self.run_sequential(&phases, cancel, &mut report).await?,
            ExecutionMode::Parallel { max_concurrency } => {
                self.run_parallel(&phases, max_concurrency, cancel, &mut report).await?
            }
        }

        Ok(report)
    }

    /// Checks a just-completed phase's violations against the early-
    /// termination trigger (spec.md line 185: an error-severity
    /// `checksum-mismatch` or `structure-violation`). Folds `violations`
    /// into `report` either way, so the caller's `report` always reflects
    /// exactly the phases that actually ran.
    fn early_termination_trigger(&self, violations: &[Violation]) -> Option<(String, ViolationType)> {
        if !self.config.early_termination {
            return None;
        }
        violations
            .iter()
            .find(|v| v.is_error() && matches!(v.kind, ViolationType::ChecksumMismatch | ViolationType::StructureViolation))
            .map(|v| (v.file.clone(), v.kind))
    }

    /// Runs each phase on a blocking-pool thread, strictly awaited in
    /// order, so the overall deadline (an `await` point between phases)
    /// can still preempt a run stuck in a later phase. With early
    /// termination enabled, a qualifying violation stops the loop before
    /// any later phase in `PHASES_IN_ORDER` is even spawned — `report`
    /// never contains more than what actually ran.
    async fn run_sequential(
        &self,
        phases: &HashMap<Phase, PhaseFn>,
        cancel: &CancellationToken,
        report: &mut Report,
    ) -> Result<(), OrchestratorError> {
        for phase in PHASES_IN_ORDER {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            if let Some(func) = phases.get(&phase).cloned() {
                let start = Instant::now();
                let violations = tokio::task::spawn_blocking(move || func())
                    .await
                    .map_err(|_| OrchestratorError::Cancelled)?;
                self.metrics.record_phase(phase, start.elapsed());

                if let Some((violation_file, violation_type)) = self.early_termination_trigger(&violations) {
                    report.extend(violations);
                    return Err(OrchestratorError::EarlyTermination {
                        violation_file,
                        violation_type,
                        partial_report: report.clone(),
                    });
                }
                report.extend(violations);
            }
        }
        Ok(())
    }

    /// Spawns every registered phase up front so they run concurrently
    /// under the semaphore; unlike `run_sequential`, a phase already
    /// spawned is already doing its work and cannot be un-run. Early
    /// termination here can only `abort()` handles for phases that have
    /// not yet been awaited by the time a qualifying violation is found —
    /// it stops collecting results, not the concurrent work itself.
    async fn run_parallel(
        &self,
        phases: &HashMap<Phase, PhaseFn>,
        max_concurrency: usize,
        cancel: &CancellationToken,
        report: &mut Report,
    ) -> Result<(), OrchestratorError> {
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut handles = Vec::new();

        for phase in PHASES_IN_ORDER {
            let Some(func) = phases.get(&phase).cloned() else {
                continue;
            };
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            let semaphore = semaphore.clone();
            handles.push((
                phase,
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                    let start = Instant::now();
                    let violations = tokio::task::spawn_blocking(move || func()).await.unwrap_or_default();
                    (start.elapsed(), violations)
                }),
            ));
        }

        let mut handles = handles.into_iter();
        while let Some((phase, handle)) = handles.next() {
            if cancel.is_cancelled() {
                for (_, h) in handles {
                    h.abort();
                }
                return Err(OrchestratorError::Cancelled);
            }
            let (duration, violations) = handle.await.map_err(|_| OrchestratorError::Cancelled)?;
            self.metrics.record_phase(phase, duration);

            if let Some((violation_file, violation_type)) = self.early_termination_trigger(&violations) {
                report.extend(violations);
                for (_, h) in handles {
                    h.abort();
                }
                return Err(OrchestratorError::EarlyTermination {
                    violation_file,
                    violation_type,
                    partial_report: report.clone(),
                });
            }
            report.extend(violations);
        }
        Ok(())
    }
}
