//! Shared primitives for the Testwright run engine: identifiers, the test
//! case data model, run lifecycle types, streamed events and the engine
//! error taxonomy.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One natural-language step of a test case. `expected_result` is optional;
/// steps without it auto-pass once their action executes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default = "StepId::new")]
    pub id: StepId,
    pub order: u32,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_result: Option<String>,
}

/// A test case: a starting URL plus an ordered list of steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default = "CaseId::new")]
    pub id: CaseId,
    pub name: String,
    pub url: String,
    pub steps: Vec<Step>,
}

impl TestCase {
    /// Steps sorted by their declared order.
    pub fn sorted_steps(&self) -> Vec<Step> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|s| s.order);
        steps
    }
}

/// A single browser action chosen by the planner for one step.
///
/// The wire shape is internally tagged on `action`, matching what the
/// planner prompt instructs the model to emit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Click { selector: String },
    Fill { selector: String, value: String },
    Goto { url: String },
    Wait { seconds: u64 },
    NoOp,
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Fill { .. } => "fill",
            Action::Goto { .. } => "goto",
            Action::Wait { .. } => "wait",
            Action::NoOp => "no_op",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click { selector } => write!(f, "click {selector}"),
            Action::Fill { selector, value } => write!(f, "fill {selector} = {value:?}"),
            Action::Goto { url } => write!(f, "goto {url}"),
            Action::Wait { seconds } => write!(f, "wait {seconds}s"),
            Action::NoOp => write!(f, "no-op"),
        }
    }
}

/// Run lifecycle state. `Pending` and `Running` are transient; the other
/// three are terminal and a run reaches exactly one of them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Passed | RunStatus::Failed | RunStatus::Stopped
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Passed => "PASSED",
            RunStatus::Failed => "FAILED",
            RunStatus::Stopped => "STOPPED",
        };
        write!(f, "{label}")
    }
}

/// Per-step verdict.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
}

/// An event on a run's stream. Serialized as `{"type": ..., "data": ...}`
/// so subscribers can dispatch on the tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    /// Human-readable progress line. Also persisted to the run record.
    Log(String),
    /// Base64-encoded PNG of the page after an action. Streamed only.
    Screenshot(String),
    StepStart { step_id: StepId, order: u32 },
    StepEnd { step_id: StepId, status: StepStatus },
    Status(RunStatus),
    Error(String),
}

impl RunEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::Log(_) => "log",
            RunEvent::Screenshot(_) => "screenshot",
            RunEvent::StepStart { .. } => "step_start",
            RunEvent::StepEnd { .. } => "step_end",
            RunEvent::Status(_) => "status",
            RunEvent::Error(_) => "error",
        }
    }
}

/// One persisted log line on a run record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

/// The persisted view of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub case_id: CaseId,
    pub status: RunStatus,
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(id: RunId, case_id: CaseId) -> Self {
        Self {
            id,
            case_id,
            status: RunStatus::Pending,
            logs: Vec::new(),
            result_summary: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Compact description of one interactive element, as captured from the
/// live page and fed to the planner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSummary {
    /// CSS selector the executor can act on (`#id`, `tag[name=..]`, or an
    /// nth-of-type path).
    pub selector: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub css_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `type` attribute for inputs, element role otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Error taxonomy for the execution engine and orchestrator.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("planner output unusable: {0}")]
    PlanParse(String),

    #[error("action execution failed: {0}")]
    ActionExecution(String),

    #[error("judge output unusable: {0}")]
    VerificationParse(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("llm request failed: {0}")]
    Llm(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("run cancelled")]
    Cancelled,
}
