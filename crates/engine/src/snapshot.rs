use serde_json::Value;
use tracing::debug;

use testwright_core_types::{ElementSummary, EngineError};

use crate::ports::PageDriver;

/// Character budget for the verification text handed to the judge.
pub const VERIFICATION_TEXT_BUDGET: usize = 6000;

/// Cap on captured elements; pages past this are summarised partially.
const MAX_ELEMENTS: usize = 150;

/// Collects the interactive elements on the page: tag, identifying
/// attributes, visible text, current value and an actionable selector.
/// Selector preference is id, then name attribute, then an nth-of-type
/// path from `body`.
pub(crate) const ELEMENTS_JS: &str = r#"(() => {
  const cap = (s, n) => {
    if (!s) return null;
    s = String(s).trim().replace(/\s+/g, ' ');
    if (!s) return null;
    return s.length > n ? s.slice(0, n) : s;
  };
  const esc = (s) => (window.CSS && CSS.escape) ? CSS.escape(s) : s;
  const selectorFor = (el) => {
    if (el.id) return '#' + esc(el.id);
    const tag = el.tagName.toLowerCase();
    const name = el.getAttribute('name');
    if (name) return tag + '[name="' + name + '"]';
    const parts = [];
    let node = el;
    while (node && node !== document.body) {
      let idx = 1;
      let sib = node;
      while ((sib = sib.previousElementSibling)) {
        if (sib.tagName === node.tagName) idx++;
      }
      parts.unshift(node.tagName.toLowerCase() + ':nth-of-type(' + idx + ')');
      node = node.parentElement;
    }
    return 'body > ' + parts.join(' > ');
  };
  const labelFor = (el) => {
    if (el.labels && el.labels.length) return el.labels[0].innerText;
    return el.getAttribute('aria-label');
  };
  const visible = (el) => {
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  };
  const out = [];
  const nodes = document.querySelectorAll(
    'a, button, input, textarea, select, [role="button"], [onclick]'
  );
  for (const el of nodes) {
    if (!visible(el)) continue;
    out.push({
      selector: selectorFor(el),
      tag: el.tagName.toLowerCase(),
      id: el.id || null,
      class: cap(el.getAttribute('class'), 80),
      name: el.getAttribute('name'),
      kind: el.getAttribute('type') || el.getAttribute('role'),
      placeholder: el.getAttribute('placeholder'),
      text: cap(el.innerText, 80),
      value: ('value' in el) ? cap(el.value, 80) : null,
      label: cap(labelFor(el), 80),
    });
    if (out.length >= 150) break;
  }
  return out;
})()"#;

/// Visible page text plus the current value of every named form field, so
/// the judge can see text that lives only inside inputs.
pub(crate) const VERIFICATION_TEXT_JS: &str = r#"(() => {
  const lines = [];
  lines.push(document.body ? document.body.innerText : '');
  const fields = document.querySelectorAll('input, textarea, select');
  for (const el of fields) {
    const name = el.getAttribute('name') || el.id || el.getAttribute('placeholder');
    if (!name) continue;
    const value = el.value;
    if (value == null || value === '') continue;
    lines.push('[field ' + name + ' = ' + value + ']');
  }
  return lines.join('\n');
})()"#;

pub async fn capture_elements(driver: &dyn PageDriver) -> Result<Vec<ElementSummary>, EngineError> {
    let value = driver.evaluate(ELEMENTS_JS).await?;
    let elements: Vec<ElementSummary> = serde_json::from_value(value)
        .map_err(|err| EngineError::Browser(format!("element snapshot unparseable: {err}")))?;
    debug!(count = elements.len(), capped = elements.len() >= MAX_ELEMENTS, "captured elements");
    Ok(elements)
}

pub async fn capture_verification_text(driver: &dyn PageDriver) -> Result<String, EngineError> {
    let value = driver.evaluate(VERIFICATION_TEXT_JS).await?;
    let text = match value {
        Value::String(text) => text,
        other => {
            return Err(EngineError::Browser(format!(
                "verification text snapshot returned {other}"
            )))
        }
    };
    Ok(truncate_chars(&text, VERIFICATION_TEXT_BUDGET))
}

fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    text.chars().take(budget).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(10);
        let truncated = truncate_chars(&text, 4);
        assert_eq!(truncated.chars().count(), 4);

        let short = truncate_chars("abc", 10);
        assert_eq!(short, "abc");
    }

    #[test]
    fn element_snapshot_parses_into_summaries() {
        let raw = serde_json::json!([
            {
                "selector": "#q",
                "tag": "input",
                "id": "q",
                "name": "q",
                "kind": "text",
                "placeholder": "Search",
                "text": null,
                "value": "rust",
                "label": null
            },
            {
                "selector": "body > form:nth-of-type(1) > button:nth-of-type(1)",
                "tag": "button",
                "text": "Go"
            }
        ]);
        let elements: Vec<ElementSummary> = serde_json::from_value(raw).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].value.as_deref(), Some("rust"));
        assert_eq!(elements[1].text.as_deref(), Some("Go"));
    }
}
