//! Chromium session management built on `chromiumoxide`.
//!
//! [`BrowserSession`] owns one launched Chromium process and one page, and
//! exposes the small set of primitives the engine needs: navigation,
//! element interaction, script evaluation, raw CDP text insertion and
//! screenshots. Every call carries a bounded timeout.

mod session;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use testwright_core_types::EngineError;

pub use session::BrowserSession;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl From<BrowserError> for EngineError {
    fn from(err: BrowserError) -> Self {
        EngineError::Browser(err.to_string())
    }
}

/// Launch and interaction settings for a browser session.
#[derive(Clone, Debug)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Explicit Chromium binary; autodetected when `None`.
    pub chrome_path: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    /// Upper bound on page navigations.
    pub nav_timeout: Duration,
    /// Upper bound on element lookups and interactions.
    pub action_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            window_width: 1280,
            window_height: 900,
            nav_timeout: Duration::from_secs(30),
            action_timeout: Duration::from_secs(10),
        }
    }
}
