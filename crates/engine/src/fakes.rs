//! Test doubles for the engine's ports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use testwright_core_types::EngineError;

use crate::ports::{BrowserFactory, PageDriver};
use crate::snapshot::{ELEMENTS_JS, VERIFICATION_TEXT_JS};

/// In-memory page driver that records every call and answers the engine's
/// snapshot and injection scripts from canned data.
pub struct FakeDriver {
    calls: Mutex<Vec<String>>,
    elements: Mutex<Value>,
    page_text: Mutex<String>,
    fail_click: AtomicBool,
    fail_type: AtomicBool,
    fail_goto: AtomicBool,
    fail_injected: AtomicBool,
    closed: AtomicBool,
    delay: Mutex<Duration>,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            elements: Mutex::new(json!([
                {
                    "selector": "#q",
                    "tag": "input",
                    "id": "q",
                    "kind": "text",
                    "placeholder": "Search"
                }
            ])),
            page_text: Mutex::new("results for rust".to_string()),
            fail_click: AtomicBool::new(false),
            fail_type: AtomicBool::new(false),
            fail_goto: AtomicBool::new(false),
            fail_injected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fail_click(&self) {
        self.fail_click.store(true, Ordering::SeqCst);
    }

    pub fn fail_type_keystrokes(&self) {
        self.fail_type.store(true, Ordering::SeqCst);
    }

    pub fn fail_goto(&self) {
        self.fail_goto.store(true, Ordering::SeqCst);
    }

    pub fn fail_injected_scripts(&self) {
        self.fail_injected.store(true, Ordering::SeqCst);
    }

    pub fn set_elements(&self, elements: Value) {
        *self.elements.lock() = elements;
    }

    pub fn set_page_text(&self, text: impl Into<String>) {
        *self.page_text.lock() = text.into();
    }

    /// Slow every driver call down, to widen step execution windows in
    /// cancellation tests.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        self.pause().await;
        self.record(format!("goto {url}"));
        if self.fail_goto.load(Ordering::SeqCst) {
            return Err(EngineError::Browser(format!("navigation failed: {url}")));
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), EngineError> {
        self.pause().await;
        self.record(format!("click {selector}"));
        if self.fail_click.load(Ordering::SeqCst) {
            return Err(EngineError::Browser(format!("element not found: {selector}")));
        }
        Ok(())
    }

    async fn type_keystrokes(&self, selector: &str, text: &str) -> Result<(), EngineError> {
        self.pause().await;
        self.record(format!("type {selector} {text}"));
        if self.fail_type.load(Ordering::SeqCst) {
            return Err(EngineError::Browser(format!("element not found: {selector}")));
        }
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> Result<(), EngineError> {
        self.record(format!("insert {text}"));
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, EngineError> {
        self.pause().await;
        if expression == ELEMENTS_JS {
            self.record("evaluate elements");
            return Ok(self.elements.lock().clone());
        }
        if expression == VERIFICATION_TEXT_JS {
            self.record("evaluate verification_text");
            return Ok(Value::String(self.page_text.lock().clone()));
        }

        let kind = if expression.contains("setAttribute('value'") {
            "force_fill"
        } else if expression.contains("el.click()") {
            "injected_click"
        } else if expression.contains("el.focus()") {
            "focus"
        } else {
            "script"
        };
        self.record(format!("evaluate {kind}"));
        Ok(Value::Bool(!self.fail_injected.load(Ordering::SeqCst)))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, EngineError> {
        self.record("screenshot");
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn wait_idle(&self, _window: Duration) {
        self.record("wait_idle");
    }

    async fn close(&self) {
        self.record("close");
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeFactory {
    driver: Arc<FakeDriver>,
}

impl FakeFactory {
    pub fn new(driver: Arc<FakeDriver>) -> Arc<Self> {
        Arc::new(Self { driver })
    }
}

#[async_trait]
impl BrowserFactory for FakeFactory {
    async fn acquire(&self) -> Result<Arc<dyn PageDriver>, EngineError> {
        Ok(Arc::clone(&self.driver) as Arc<dyn PageDriver>)
    }
}
