use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use testwright_core_types::{
    CaseId, EngineError, RunEvent, RunId, RunRecord, RunStatus, StepStatus, TestCase,
};
use testwright_event_bus::EventHub;
use testwright_llm::{Planner, VerdictStatus, Verifier};

use crate::emitter::RunEmitter;
use crate::executor::execute_action;
use crate::ports::{BrowserFactory, CaseRepository, PageDriver};
use crate::snapshot;
use crate::store::RunStore;

/// Engine-wide execution settings.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Circuit breaker on steps executed per run.
    pub max_steps: usize,
    /// Settle window after click navigation.
    pub settle: Duration,
    /// Ceiling on a single planned wait action.
    pub max_wait: Duration,
    /// Attach a page screenshot to planning requests.
    pub use_vision: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_steps: 30,
            settle: Duration::from_millis(1500),
            max_wait: Duration::from_secs(30),
            use_vision: false,
        }
    }
}

/// What a subscriber gets when attaching to a run.
pub enum Subscription {
    /// The run is live: its status so far plus a receiver for everything
    /// published after the attach.
    Live {
        status: RunStatus,
        receiver: broadcast::Receiver<RunEvent>,
    },
    /// The run already finished; only its terminal status remains.
    Finished { status: RunStatus },
}

struct ActiveRun {
    cancel: CancellationToken,
}

struct RunOutcome {
    passed: bool,
    summary: Option<String>,
}

/// Owns run lifecycles: creates runs, executes them on background tasks,
/// fans out their events and honours stop requests.
pub struct Orchestrator {
    settings: EngineSettings,
    cases: Arc<dyn CaseRepository>,
    store: Arc<dyn RunStore>,
    hub: Arc<EventHub>,
    browser: Arc<dyn BrowserFactory>,
    planner: Planner,
    verifier: Verifier,
    active: DashMap<RunId, ActiveRun>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: EngineSettings,
        cases: Arc<dyn CaseRepository>,
        store: Arc<dyn RunStore>,
        hub: Arc<EventHub>,
        browser: Arc<dyn BrowserFactory>,
        planner: Planner,
        verifier: Verifier,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            cases,
            store,
            hub,
            browser,
            planner,
            verifier,
            active: DashMap::new(),
        })
    }

    /// Create a run for a case and start executing it in the background.
    /// Returns the run id as soon as the run record exists.
    pub async fn start(self: &Arc<Self>, case_id: &CaseId) -> Result<RunId, EngineError> {
        let case = self.cases.get(case_id).await?;

        let run_id = RunId::new();
        self.store
            .create(RunRecord::new(run_id.clone(), case_id.clone()))
            .await;
        self.hub.register(&run_id);

        let cancel = CancellationToken::new();
        self.active.insert(
            run_id.clone(),
            ActiveRun {
                cancel: cancel.clone(),
            },
        );

        let orchestrator = Arc::clone(self);
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            orchestrator.execute_run(task_run_id, case, cancel).await;
        });

        info!(run_id = %run_id, case_id = %case_id, "run started");
        Ok(run_id)
    }

    /// Request cancellation of a run. Idempotent: stopping a finished or
    /// already-stopping run succeeds without effect. A non-terminal record
    /// with no live task is reconciled to `STOPPED`.
    pub async fn stop(&self, run_id: &RunId) -> Result<(), EngineError> {
        if let Some(active) = self.active.get(run_id) {
            active.cancel.cancel();
            info!(run_id = %run_id, "stop requested");
            return Ok(());
        }

        match self.store.get(run_id).await {
            Some(record) if record.status.is_terminal() => Ok(()),
            Some(record) => {
                warn!(
                    run_id = %run_id,
                    status = %record.status,
                    "no live task for non-terminal run; reconciling to STOPPED"
                );
                self.store
                    .set_status(
                        run_id,
                        RunStatus::Stopped,
                        Some("stopped while no executor task was attached".to_string()),
                    )
                    .await;
                self.hub.emit(run_id, RunEvent::Status(RunStatus::Stopped));
                self.hub.remove(run_id);
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("run {run_id}"))),
        }
    }

    /// Attach to a run's event stream. Finished runs yield their terminal
    /// status from the store instead of a receiver.
    pub async fn subscribe(&self, run_id: &RunId) -> Result<Subscription, EngineError> {
        if let Some((status, receiver)) = self.hub.subscribe(run_id) {
            return Ok(Subscription::Live { status, receiver });
        }
        match self.store.get(run_id).await {
            Some(record) => Ok(Subscription::Finished {
                status: record.status,
            }),
            None => Err(EngineError::NotFound(format!("run {run_id}"))),
        }
    }

    pub async fn run_record(&self, run_id: &RunId) -> Option<RunRecord> {
        self.store.get(run_id).await
    }

    async fn execute_run(self: Arc<Self>, run_id: RunId, case: TestCase, cancel: CancellationToken) {
        let emitter = RunEmitter::new(
            run_id.clone(),
            Arc::clone(&self.hub),
            Arc::clone(&self.store),
        );

        self.store
            .set_status(&run_id, RunStatus::Running, None)
            .await;
        emitter.status(RunStatus::Running).await;

        let outcome = self.run_case(&case, &cancel, &emitter).await;

        let (status, summary) = match outcome {
            Ok(outcome) if outcome.passed => {
                (RunStatus::Passed, Some("all steps passed".to_string()))
            }
            Ok(outcome) => (
                RunStatus::Failed,
                outcome
                    .summary
                    .or_else(|| Some("one or more steps failed".to_string())),
            ),
            Err(EngineError::Cancelled) => {
                (RunStatus::Stopped, Some("stopped by user".to_string()))
            }
            Err(err) => {
                emitter.error(err.to_string()).await;
                (RunStatus::Failed, Some(err.to_string()))
            }
        };

        self.store
            .set_status(&run_id, status, summary)
            .await;
        emitter.status(status).await;
        self.hub.remove(&run_id);
        self.active.remove(&run_id);

        info!(run_id = %run_id, status = %status, "run finished");
    }

    async fn run_case(
        &self,
        case: &TestCase,
        cancel: &CancellationToken,
        emitter: &RunEmitter,
    ) -> Result<RunOutcome, EngineError> {
        let driver = self.browser.acquire().await?;
        let result = self
            .run_steps(driver.as_ref(), case, cancel, emitter)
            .await;
        // The browser is released on every exit path, including errors and
        // cancellation.
        driver.close().await;
        result
    }

    async fn run_steps(
        &self,
        driver: &dyn PageDriver,
        case: &TestCase,
        cancel: &CancellationToken,
        emitter: &RunEmitter,
    ) -> Result<RunOutcome, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        driver.goto(&case.url).await?;
        emitter.log(format!("opened {}", case.url)).await;

        let steps = case.sorted_steps();
        let mut all_passed = true;

        for (index, step) in steps.iter().enumerate() {
            // Cancellation is honoured at step boundaries; an action in
            // flight finishes first.
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if index >= self.settings.max_steps {
                let summary = format!("step budget of {} reached", self.settings.max_steps);
                emitter.log(summary.clone()).await;
                return Ok(RunOutcome {
                    passed: false,
                    summary: Some(summary),
                });
            }

            emitter
                .emit(RunEvent::StepStart {
                    step_id: step.id.clone(),
                    order: step.order,
                })
                .await;
            emitter
                .log(format!("step {}: {}", step.order, step.instruction))
                .await;

            let elements = snapshot::capture_elements(driver).await?;
            let planning_shot = if self.settings.use_vision {
                match driver.screenshot().await {
                    Ok(png) => Some(png),
                    Err(err) => {
                        debug!(error = %err, "planning screenshot failed; continuing text-only");
                        None
                    }
                }
            } else {
                None
            };

            let action = self
                .planner
                .plan(
                    &step.instruction,
                    step.expected_result.as_deref(),
                    &elements,
                    planning_shot,
                )
                .await?;
            emitter.log(format!("planned action: {action}")).await;

            execute_action(
                driver,
                emitter,
                &action,
                self.settings.settle,
                self.settings.max_wait,
            )
            .await?;

            match driver.screenshot().await {
                Ok(png) => {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(png);
                    emitter.emit(RunEvent::Screenshot(encoded)).await;
                }
                Err(err) => debug!(error = %err, "post-action screenshot failed"),
            }

            let status = match &step.expected_result {
                None => {
                    emitter.log("no expected result; step passes").await;
                    StepStatus::Passed
                }
                Some(expected) => {
                    let text = snapshot::capture_verification_text(driver).await?;
                    match self.verifier.verify(&step.instruction, expected, &text).await {
                        Ok(verdict) => {
                            if let Some(reason) = &verdict.reason {
                                emitter.log(format!("judge: {reason}")).await;
                            }
                            match verdict.status {
                                VerdictStatus::Passed => StepStatus::Passed,
                                VerdictStatus::Failed => StepStatus::Failed,
                            }
                        }
                        // A judge we cannot parse fails the step closed but
                        // does not abort the run.
                        Err(EngineError::VerificationParse(msg)) => {
                            emitter
                                .log(format!("judge response unusable ({msg}); step fails closed"))
                                .await;
                            StepStatus::Failed
                        }
                        Err(other) => return Err(other),
                    }
                }
            };

            if status == StepStatus::Failed {
                all_passed = false;
            }
            emitter
                .emit(RunEvent::StepEnd {
                    step_id: step.id.clone(),
                    status,
                })
                .await;
        }

        Ok(RunOutcome {
            passed: all_passed,
            summary: None,
        })
    }
}
