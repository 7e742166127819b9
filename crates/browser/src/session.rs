use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{BrowserError, LaunchOptions};

/// How often an element lookup is retried while waiting for it to attach.
const FIND_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One launched Chromium process with a single active page.
pub struct BrowserSession {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    page: Page,
    options: LaunchOptions,
}

impl BrowserSession {
    /// Launch Chromium and open a blank page.
    pub async fn launch(options: LaunchOptions) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .window_size(options.window_width, options.window_height)
            .no_sandbox()
            .request_timeout(options.nav_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // The handler stream must be drained for the CDP connection to
        // make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "browser handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
            page,
            options,
        })
    }

    pub async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        tokio::time::timeout(self.options.nav_timeout, self.page.goto(url))
            .await
            .map_err(|_| BrowserError::Timeout(format!("navigation to {url}")))?
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;
        Ok(())
    }

    /// Look up an element, retrying briefly so freshly rendered nodes get a
    /// chance to attach.
    async fn find(&self, selector: &str) -> Result<Element, BrowserError> {
        let deadline = tokio::time::Instant::now() + self.options.action_timeout;
        loop {
            match self.page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(FIND_POLL_INTERVAL).await;
                }
                Err(_) => {
                    return Err(BrowserError::ElementNotFound {
                        selector: selector.to_string(),
                    })
                }
            }
        }
    }

    pub async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self.find(selector).await?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(())
    }

    pub async fn focus(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self.find(selector).await?;
        element
            .focus()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(())
    }

    /// Click into the element and type the text key by key, firing the full
    /// keyboard event sequence.
    pub async fn type_keystrokes(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let element = self.find(selector).await?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        element
            .type_str(text)
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(())
    }

    /// Insert text into the focused element via `Input.insertText`, which
    /// bypasses per-key events but still goes through the input pipeline.
    pub async fn insert_text(&self, text: &str) -> Result<(), BrowserError> {
        let params = InsertTextParams::builder()
            .text(text)
            .build()
            .map_err(BrowserError::Protocol)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(())
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    pub async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    /// Give the page a moment to settle after an action. If a navigation is
    /// in flight, wait for it up to the window; otherwise this is a sleep.
    pub async fn wait_idle(&self, window: Duration) {
        let _ = tokio::time::timeout(window, self.page.wait_for_navigation()).await;
    }

    pub async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.close().await {
            warn!(error = %err, "browser did not close cleanly");
        }
        self.handler_task.abort();
    }
}
