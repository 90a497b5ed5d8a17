//! Compensating-action sequencer for multi-backend lifecycle operations.
//!
//! There is no native transaction spanning the record store, the identity
//! service, and the account directory. Operations that must change state in
//! more than one of them run as a saga: an ordered list of steps, each of
//! which knows how to undo itself. On the first failed step, the steps that
//! already committed are compensated in reverse order.
//!
//! The engine holds no persistent log. A process crash mid-saga leaves
//! whatever the completed steps wrote; recovery is an operator concern.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, error, warn};

/// One reversible unit of work inside a [`Saga`].
///
/// A step owns whatever state its compensation needs: a step that claims an
/// account keeps the pre-claim record so it can write it back. `begin` and
/// `compensate` are each invoked at most once per run.
#[async_trait]
pub trait SagaStep: Send {
    /// Stable label used in logs and error messages.
    fn name(&self) -> &str;

    /// Perform the step's forward action.
    async fn begin(&mut self) -> anyhow::Result<()>;

    /// Undo a previously successful `begin`.
    async fn compensate(&mut self) -> anyhow::Result<()>;
}

/// A single compensation that failed during rollback.
#[derive(Debug)]
pub struct CompensationFailure {
    pub step: String,
    pub error: anyhow::Error,
}

/// Failure surface of [`Saga::run`].
///
/// The two variants are deliberately distinct for callers: `Aborted` means
/// every completed step was rolled back and the operation is safe to retry;
/// `CompensationFailed` means the backends are now inconsistent and need
/// operator attention.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("saga '{saga}' aborted at step '{step}', all completed steps rolled back: {source}")]
    Aborted {
        saga: String,
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "saga '{saga}' failed at step '{step}' and rollback of [{}] also failed: {source}",
        .failures.iter().map(|f| f.step.as_str()).collect::<Vec<_>>().join(", ")
    )]
    CompensationFailed {
        saga: String,
        step: String,
        source: anyhow::Error,
        /// Every compensation error, in the (reverse) order the
        /// compensations ran. Never empty.
        failures: Vec<CompensationFailure>,
    },
}

impl SagaError {
    /// The step whose `begin` originally failed.
    pub fn failed_step(&self) -> &str {
        match self {
            SagaError::Aborted { step, .. } | SagaError::CompensationFailed { step, .. } => step,
        }
    }

    /// The original cause of the failure.
    pub fn cause(&self) -> &anyhow::Error {
        match self {
            SagaError::Aborted { source, .. } | SagaError::CompensationFailed { source, .. } => {
                source
            }
        }
    }

    /// Whether the operation left the backends in their pre-saga state.
    pub fn rolled_back(&self) -> bool {
        matches!(self, SagaError::Aborted { .. })
    }
}

/// An ordered sequence of reversible steps.
///
/// Steps run strictly in declared order; step N+1 only begins after step N's
/// `begin` resolved successfully. A zero- or single-step saga degenerates to
/// a plain call: no compensation is ever invoked on success.
pub struct Saga {
    name: &'static str,
    steps: Vec<Box<dyn SagaStep>>,
}

impl Saga {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl SagaStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn push(&mut self, step: impl SagaStep + 'static) {
        self.steps.push(Box::new(step));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Execute all steps in order.
    ///
    /// On the first `begin` failure, compensates the already-completed steps
    /// in reverse order, regardless of individual compensation outcomes,
    /// and collects every compensation error. The failed step itself is
    /// never compensated.
    pub async fn run(self) -> Result<(), SagaError> {
        let mut completed: Vec<Box<dyn SagaStep>> = Vec::with_capacity(self.steps.len());

        for mut step in self.steps {
            match step.begin().await {
                Ok(()) => {
                    debug!(saga = self.name, step = step.name(), "step committed");
                    completed.push(step);
                }
                Err(cause) => {
                    let failed = step.name().to_string();
                    warn!(
                        saga = self.name,
                        step = %failed,
                        completed = completed.len(),
                        error = %cause,
                        "step failed, rolling back"
                    );

                    let mut failures = Vec::new();
                    for mut done in completed.into_iter().rev() {
                        match done.compensate().await {
                            Ok(()) => {
                                debug!(saga = self.name, step = done.name(), "step compensated");
                            }
                            Err(e) => {
                                error!(
                                    saga = self.name,
                                    step = done.name(),
                                    error = %e,
                                    "compensation failed, state may be inconsistent"
                                );
                                failures.push(CompensationFailure {
                                    step: done.name().to_string(),
                                    error: e,
                                });
                            }
                        }
                    }

                    return Err(if failures.is_empty() {
                        SagaError::Aborted {
                            saga: self.name.to_string(),
                            step: failed,
                            source: cause,
                        }
                    } else {
                        SagaError::CompensationFailed {
                            saga: self.name.to_string(),
                            step: failed,
                            source: cause,
                            failures,
                        }
                    });
                }
            }
        }

        Ok(())
    }
}

type StepFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A [`SagaStep`] built from a pair of closures.
///
/// This is the combinator that turns any update-shaped operation into a saga
/// step without a bespoke struct; the orchestrator composes most of its
/// identity and directory calls through it.
pub struct FnStep {
    name: &'static str,
    begin: Option<Box<dyn FnOnce() -> StepFuture + Send>>,
    compensate: Option<Box<dyn FnOnce() -> StepFuture + Send>>,
}

#[async_trait]
impl SagaStep for FnStep {
    fn name(&self) -> &str {
        self.name
    }

    async fn begin(&mut self) -> anyhow::Result<()> {
        match self.begin.take() {
            Some(f) => f().await,
            None => Err(anyhow::anyhow!("step '{}' begun twice", self.name)),
        }
    }

    async fn compensate(&mut self) -> anyhow::Result<()> {
        match self.compensate.take() {
            Some(f) => f().await,
            None => Err(anyhow::anyhow!("step '{}' compensated twice", self.name)),
        }
    }
}

/// Build a step from a forward closure and a compensation closure.
pub fn step_fn<B, BF, C, CF>(name: &'static str, begin: B, compensate: C) -> FnStep
where
    B: FnOnce() -> BF + Send + 'static,
    BF: Future<Output = anyhow::Result<()>> + Send + 'static,
    C: FnOnce() -> CF + Send + 'static,
    CF: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnStep {
        name,
        begin: Some(Box::new(move || Box::pin(begin()))),
        compensate: Some(Box::new(move || Box::pin(compensate()))),
    }
}

/// Build a step whose compensation is a no-op.
///
/// Used for actions that are deliberately one-way, such as the access
/// revocations during account ejection: once revoked, access stays revoked
/// even if a later step fails.
pub fn one_way<B, BF>(name: &'static str, begin: B) -> FnStep
where
    B: FnOnce() -> BF + Send + 'static,
    BF: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnStep {
        name,
        begin: Some(Box::new(move || Box::pin(begin()))),
        compensate: Some(Box::new(|| Box::pin(async { Ok(()) }))),
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Shared call log so tests can assert exact invocation order.
    type Log = Arc<Mutex<Vec<String>>>;

    fn logged_step(
        log: &Log,
        name: &'static str,
        fail_begin: bool,
        fail_compensate: bool,
    ) -> FnStep {
        let begin_log = log.clone();
        let comp_log = log.clone();
        step_fn(
            name,
            move || async move {
                begin_log.lock().unwrap().push(format!("begin:{name}"));
                if fail_begin {
                    anyhow::bail!("{name} begin blew up");
                }
                Ok(())
            },
            move || async move {
                comp_log.lock().unwrap().push(format!("compensate:{name}"));
                if fail_compensate {
                    anyhow::bail!("{name} compensate blew up");
                }
                Ok(())
            },
        )
    }

    #[tokio::test]
    async fn all_steps_commit_in_order() {
        let log: Log = Default::default();
        let saga = Saga::new("happy")
            .step(logged_step(&log, "a", false, false))
            .step(logged_step(&log, "b", false, false))
            .step(logged_step(&log, "c", false, false));

        saga.run().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["begin:a", "begin:b", "begin:c"],
            "no compensation may run on success"
        );
    }

    #[tokio::test]
    async fn empty_saga_is_a_noop() {
        Saga::new("empty").run().await.unwrap();
    }

    #[tokio::test]
    async fn single_step_failure_has_nothing_to_compensate() {
        let log: Log = Default::default();
        let err = Saga::new("single")
            .step(logged_step(&log, "only", true, false))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, SagaError::Aborted { .. }));
        assert_eq!(err.failed_step(), "only");
        assert_eq!(*log.lock().unwrap(), vec!["begin:only"]);
    }

    #[tokio::test]
    async fn failure_compensates_completed_steps_in_reverse_order() {
        let log: Log = Default::default();
        let err = Saga::new("rollback")
            .step(logged_step(&log, "a", false, false))
            .step(logged_step(&log, "b", false, false))
            .step(logged_step(&log, "c", true, false))
            .step(logged_step(&log, "d", false, false))
            .run()
            .await
            .unwrap_err();

        assert!(err.rolled_back());
        assert_eq!(err.failed_step(), "c");
        assert!(err.cause().to_string().contains("c begin blew up"));
        // d never began; c is never compensated; a and b roll back in
        // reverse completion order, exactly once each.
        assert_eq!(
            *log.lock().unwrap(),
            vec!["begin:a", "begin:b", "begin:c", "compensate:b", "compensate:a"]
        );
    }

    #[tokio::test]
    async fn compensation_failures_are_aggregated_not_last_wins() {
        let log: Log = Default::default();
        let err = Saga::new("dirty")
            .step(logged_step(&log, "a", false, true))
            .step(logged_step(&log, "b", false, false))
            .step(logged_step(&log, "c", false, true))
            .step(logged_step(&log, "boom", true, false))
            .run()
            .await
            .unwrap_err();

        match &err {
            SagaError::CompensationFailed { step, failures, .. } => {
                assert_eq!(step, "boom");
                let names: Vec<&str> = failures.iter().map(|f| f.step.as_str()).collect();
                assert_eq!(names, vec!["c", "a"], "both failures kept, reverse order");
            }
            other => panic!("expected CompensationFailed, got {other:?}"),
        }
        assert!(!err.rolled_back());
        // Every completed step was still attempted despite c failing first.
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "begin:a",
                "begin:b",
                "begin:c",
                "begin:boom",
                "compensate:c",
                "compensate:b",
                "compensate:a"
            ]
        );
    }

    #[tokio::test]
    async fn later_steps_never_begin_after_a_failure() {
        let log: Log = Default::default();
        let _ = Saga::new("short-circuit")
            .step(logged_step(&log, "first", true, false))
            .step(logged_step(&log, "second", false, false))
            .run()
            .await;

        assert_eq!(*log.lock().unwrap(), vec!["begin:first"]);
    }

    #[tokio::test]
    async fn one_way_step_compensation_is_a_noop() {
        let log: Log = Default::default();
        let begin_log = log.clone();
        let err = Saga::new("one-way")
            .step(one_way("revoke", move || async move {
                begin_log.lock().unwrap().push("begin:revoke".into());
                Ok(())
            }))
            .step(logged_step(&log, "boom", true, false))
            .run()
            .await
            .unwrap_err();

        // The one-way step "compensates" without error and without undoing
        // anything, so the saga still reports a clean rollback.
        assert!(err.rolled_back());
        assert_eq!(*log.lock().unwrap(), vec!["begin:revoke", "begin:boom"]);
    }
}
