//! Implements the engine's browser ports on top of [`testwright_browser`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use testwright_browser::{BrowserSession, LaunchOptions};
use testwright_core_types::EngineError;
use testwright_engine::{BrowserFactory, PageDriver};

use crate::config::BrowserConfig;

pub struct ChromiumPageDriver {
    session: BrowserSession,
}

#[async_trait]
impl PageDriver for ChromiumPageDriver {
    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        self.session.goto(url).await.map_err(Into::into)
    }

    async fn click(&self, selector: &str) -> Result<(), EngineError> {
        self.session.click(selector).await.map_err(Into::into)
    }

    async fn type_keystrokes(&self, selector: &str, text: &str) -> Result<(), EngineError> {
        self.session
            .type_keystrokes(selector, text)
            .await
            .map_err(Into::into)
    }

    async fn insert_text(&self, text: &str) -> Result<(), EngineError> {
        self.session.insert_text(text).await.map_err(Into::into)
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, EngineError> {
        self.session.evaluate(expression).await.map_err(Into::into)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, EngineError> {
        self.session.screenshot().await.map_err(Into::into)
    }

    async fn wait_idle(&self, window: Duration) {
        self.session.wait_idle(window).await;
    }

    async fn close(&self) {
        self.session.close().await;
    }
}

/// Launches a fresh Chromium session per run.
pub struct ChromiumBrowserFactory {
    options: LaunchOptions,
}

impl ChromiumBrowserFactory {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            options: LaunchOptions {
                headless: config.headless,
                chrome_path: config.chrome_path.clone(),
                nav_timeout: Duration::from_secs(config.nav_timeout_secs),
                action_timeout: Duration::from_secs(config.action_timeout_secs),
                ..LaunchOptions::default()
            },
        }
    }
}

#[async_trait]
impl BrowserFactory for ChromiumBrowserFactory {
    async fn acquire(&self) -> Result<Arc<dyn PageDriver>, EngineError> {
        let session = BrowserSession::launch(self.options.clone()).await?;
        Ok(Arc::new(ChromiumPageDriver { session }))
    }
}
