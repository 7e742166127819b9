use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use testwright_core_types::{CaseId, EngineError, TestCase};

/// The browser primitives the engine drives. Implementations carry their
/// own bounded timeouts; the engine never waits unbounded on any call.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), EngineError>;

    /// Standard click: locate the element and click it through the input
    /// pipeline.
    async fn click(&self, selector: &str) -> Result<(), EngineError>;

    /// Click into the element and type the text key by key.
    async fn type_keystrokes(&self, selector: &str, text: &str) -> Result<(), EngineError>;

    /// Insert text into the currently focused element without per-key
    /// events.
    async fn insert_text(&self, text: &str) -> Result<(), EngineError>;

    /// Evaluate a script in the page and return its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<Value, EngineError>;

    /// PNG of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, EngineError>;

    /// Let the page settle after an action, bounded by `window`.
    async fn wait_idle(&self, window: Duration);

    async fn close(&self);
}

/// Hands out a fresh page driver per run.
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn PageDriver>, EngineError>;
}

/// Source of test case definitions.
#[async_trait]
pub trait CaseRepository: Send + Sync {
    async fn get(&self, id: &CaseId) -> Result<TestCase, EngineError>;
    async fn list(&self) -> Vec<TestCase>;
}

#[derive(Default)]
pub struct InMemoryCaseRepository {
    cases: DashMap<CaseId, TestCase>,
}

impl InMemoryCaseRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, case: TestCase) {
        self.cases.insert(case.id.clone(), case);
    }
}

#[async_trait]
impl CaseRepository for InMemoryCaseRepository {
    async fn get(&self, id: &CaseId) -> Result<TestCase, EngineError> {
        self.cases
            .get(id)
            .map(|c| c.clone())
            .ok_or_else(|| EngineError::NotFound(format!("case {id}")))
    }

    async fn list(&self) -> Vec<TestCase> {
        self.cases.iter().map(|c| c.clone()).collect()
    }
}
