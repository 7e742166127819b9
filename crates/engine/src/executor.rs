use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use testwright_core_types::{Action, EngineError};

use crate::emitter::RunEmitter;
use crate::ports::PageDriver;

/// Execute one planned action with tiered fallbacks.
///
/// Clicks try the standard input pipeline first and fall back to an
/// injected `el.click()`. Fills try real keystrokes, then raw CDP text
/// insertion, and always finish with a forced value assignment that fires
/// bubbling `input`/`change` events so framework-bound state converges on
/// the final value regardless of which entry tier worked.
pub async fn execute_action(
    driver: &dyn PageDriver,
    emitter: &RunEmitter,
    action: &Action,
    settle: Duration,
    max_wait: Duration,
) -> Result<(), EngineError> {
    match action {
        Action::Click { selector } => {
            execute_click(driver, emitter, selector).await?;
            driver.wait_idle(settle).await;
        }
        Action::Fill { selector, value } => {
            execute_fill(driver, emitter, selector, value).await?;
        }
        Action::Goto { url } => {
            driver
                .goto(url)
                .await
                .map_err(|err| EngineError::ActionExecution(format!("goto {url}: {err}")))?;
            emitter.log(format!("navigated to {url}")).await;
        }
        Action::Wait { seconds } => {
            // The delay is model output; cap it so a drifting planner cannot
            // park the run beyond the configured ceiling.
            let requested = Duration::from_secs(*seconds);
            let delay = requested.min(max_wait);
            if delay < requested {
                emitter
                    .log(format!(
                        "requested wait of {seconds}s capped to {}s",
                        delay.as_secs()
                    ))
                    .await;
            }
            tokio::time::sleep(delay).await;
            emitter.log(format!("waited {}s", delay.as_secs())).await;
        }
        Action::NoOp => {
            emitter.log("planner chose no-op; nothing to do").await;
        }
    }
    Ok(())
}

async fn execute_click(
    driver: &dyn PageDriver,
    emitter: &RunEmitter,
    selector: &str,
) -> Result<(), EngineError> {
    match driver.click(selector).await {
        Ok(()) => {
            emitter.log(format!("clicked {selector}")).await;
            return Ok(());
        }
        Err(err) => {
            emitter
                .log(format!(
                    "standard click on {selector} failed ({err}); trying injected click"
                ))
                .await;
        }
    }

    if evaluate_found(driver, &injected_click_js(selector)).await {
        emitter.log(format!("injected click on {selector}")).await;
        Ok(())
    } else {
        Err(EngineError::ActionExecution(format!(
            "click tiers exhausted for {selector}"
        )))
    }
}

async fn execute_fill(
    driver: &dyn PageDriver,
    emitter: &RunEmitter,
    selector: &str,
    value: &str,
) -> Result<(), EngineError> {
    let mut entered = false;

    match driver.type_keystrokes(selector, value).await {
        Ok(()) => {
            entered = true;
            emitter.log(format!("typed into {selector}")).await;
        }
        Err(err) => {
            emitter
                .log(format!(
                    "keystroke entry into {selector} failed ({err}); trying text insertion"
                ))
                .await;
            if evaluate_found(driver, &focus_js(selector)).await
                && driver.insert_text(value).await.is_ok()
            {
                entered = true;
                emitter.log(format!("inserted text into {selector}")).await;
            } else {
                emitter
                    .log(format!(
                        "text insertion into {selector} failed; relying on forced assignment"
                    ))
                    .await;
            }
        }
    }

    // The forced assignment runs unconditionally. Keystroke and insertion
    // entry can leave framework-bound inputs holding a stale model value;
    // assigning and firing input/change makes the final state canonical.
    let forced = evaluate_found(driver, &force_fill_js(selector, value)).await;
    if forced {
        debug!(selector, "forced value assignment applied");
    } else if entered {
        warn!(selector, "forced value assignment failed after successful entry");
    } else {
        return Err(EngineError::ActionExecution(format!(
            "fill tiers exhausted for {selector}"
        )));
    }

    Ok(())
}

/// Run an injected script that answers `true` when it found and handled
/// its element. Script errors count as not found.
async fn evaluate_found(driver: &dyn PageDriver, expression: &str) -> bool {
    matches!(driver.evaluate(expression).await, Ok(Value::Bool(true)))
}

/// Escape a string for embedding inside a single-quoted JS literal.
fn js_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}

fn injected_click_js(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector('{}'); if (!el) return false; el.click(); return true; }})()",
        js_escape(selector)
    )
}

fn focus_js(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector('{}'); if (!el) return false; el.focus(); return true; }})()",
        js_escape(selector)
    )
}

fn force_fill_js(selector: &str, value: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector('{sel}'); if (!el) return false; \
el.focus(); el.value = '{val}'; el.setAttribute('value', '{val}'); \
el.dispatchEvent(new Event('input', {{bubbles: true}})); \
el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()",
        sel = js_escape(selector),
        val = js_escape(value)
    )
}
