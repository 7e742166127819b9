use std::sync::Arc;

use tracing::debug;

use testwright_core_types::{Action, ElementSummary, EngineError};

use crate::client::{ChatProvider, ChatRequest};
use crate::utils::extract_json_object;
use crate::LlmError;

const PLANNER_SYSTEM_PROMPT: &str = r#"You are a browser automation planner. You are given one test step and a snapshot of the interactive elements on the current page. Choose exactly one action that carries out the step.

Respond with a single JSON object and nothing else. The supported actions are:

{"action": "click", "selector": "<css selector>"}
{"action": "fill", "selector": "<css selector>", "value": "<text to enter>"}
{"action": "goto", "url": "<absolute url>"}
{"action": "wait", "seconds": <integer>}
{"action": "no_op"}

Rules:
- Use a selector from the element list whenever one matches the step.
- Prefer stable selectors: an id, then a name attribute, then the listed path.
- Use "no_op" only when the step requires no browser interaction.
- Never invent selectors for elements that are not in the list."#;

const MAX_ELEMENT_LINES: usize = 120;

/// Turns one natural-language step into a single executable [`Action`].
pub struct Planner {
    provider: Arc<dyn ChatProvider>,
}

impl Planner {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    pub async fn plan(
        &self,
        instruction: &str,
        expected_result: Option<&str>,
        elements: &[ElementSummary],
        screenshot_png: Option<Vec<u8>>,
    ) -> Result<Action, EngineError> {
        let request = ChatRequest {
            system: PLANNER_SYSTEM_PROMPT.to_string(),
            user: build_user_message(instruction, expected_result, elements),
            screenshot_png,
        };

        let content = self.provider.complete_json(&request).await.map_err(|err| {
            match err {
                // A well-formed HTTP exchange that yields no usable text is
                // still a planning failure, not a transport one.
                LlmError::Malformed(msg) => EngineError::PlanParse(msg),
                other => EngineError::from(other),
            }
        })?;

        let json = extract_json_object(&content).ok_or_else(|| {
            EngineError::PlanParse(format!("no JSON object in planner response: {content}"))
        })?;

        let action: Action = serde_json::from_str(&json)
            .map_err(|err| EngineError::PlanParse(format!("invalid action payload: {err}")))?;

        debug!(action = %action, "planner selected action");
        Ok(action)
    }
}

fn build_user_message(
    instruction: &str,
    expected_result: Option<&str>,
    elements: &[ElementSummary],
) -> String {
    let mut message = String::new();
    message.push_str("## Step\n");
    message.push_str(instruction);
    message.push('\n');

    if let Some(expected) = expected_result {
        message.push_str("\n## Expected result\n");
        message.push_str(expected);
        message.push('\n');
    }

    message.push_str("\n## Interactive elements\n");
    if elements.is_empty() {
        message.push_str("(none captured)\n");
    }
    for element in elements.iter().take(MAX_ELEMENT_LINES) {
        message.push_str(&render_element(element));
        message.push('\n');
    }
    if elements.len() > MAX_ELEMENT_LINES {
        message.push_str(&format!(
            "... {} more elements omitted\n",
            elements.len() - MAX_ELEMENT_LINES
        ));
    }

    message
}

fn render_element(element: &ElementSummary) -> String {
    let mut line = format!("- selector: {} | tag: {}", element.selector, element.tag);
    if let Some(kind) = &element.kind {
        line.push_str(&format!(" | type: {kind}"));
    }
    if let Some(name) = &element.name {
        line.push_str(&format!(" | name: {name}"));
    }
    if let Some(placeholder) = &element.placeholder {
        line.push_str(&format!(" | placeholder: {placeholder}"));
    }
    if let Some(label) = &element.label {
        line.push_str(&format!(" | label: {label}"));
    }
    if let Some(text) = &element.text {
        line.push_str(&format!(" | text: {text}"));
    }
    if let Some(value) = &element.value {
        line.push_str(&format!(" | value: {value}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScriptedChatProvider;

    fn sample_elements() -> Vec<ElementSummary> {
        vec![ElementSummary {
            selector: "#q".to_string(),
            tag: "input".to_string(),
            kind: Some("text".to_string()),
            placeholder: Some("Search".to_string()),
            ..Default::default()
        }]
    }

    #[test]
    fn user_message_lists_step_and_elements() {
        let message = build_user_message("Type rust", Some("Results appear"), &sample_elements());
        assert!(message.contains("## Step"));
        assert!(message.contains("Type rust"));
        assert!(message.contains("## Expected result"));
        assert!(message.contains("selector: #q"));
        assert!(message.contains("placeholder: Search"));
    }

    #[tokio::test]
    async fn plan_parses_fenced_action() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_response(
            "Here you go:\n```json\n{\"action\":\"fill\",\"selector\":\"#q\",\"value\":\"rust\"}\n```",
        );
        let planner = Planner::new(provider);
        let action = planner
            .plan("Type rust", None, &sample_elements(), None)
            .await
            .unwrap();
        assert_eq!(
            action,
            Action::Fill {
                selector: "#q".to_string(),
                value: "rust".to_string()
            }
        );
    }

    #[tokio::test]
    async fn plan_rejects_prose_response() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_response("I would click the search box.");
        let planner = Planner::new(provider);
        let err = planner
            .plan("Type rust", None, &sample_elements(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PlanParse(_)));
    }

    #[tokio::test]
    async fn plan_rejects_unknown_action_kind() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_response("{\"action\":\"hover\",\"selector\":\"#q\"}");
        let planner = Planner::new(provider);
        let err = planner
            .plan("Hover the box", None, &sample_elements(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PlanParse(_)));
    }

    #[tokio::test]
    async fn plan_surfaces_transport_errors_as_llm() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_error(LlmError::Transport("connection refused".to_string()));
        let planner = Planner::new(provider);
        let err = planner
            .plan("Type rust", None, &sample_elements(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Llm(_)));
    }
}
