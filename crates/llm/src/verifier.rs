use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use testwright_core_types::EngineError;

use crate::client::{ChatProvider, ChatRequest};
use crate::utils::extract_json_object;
use crate::LlmError;

const VERIFIER_SYSTEM_PROMPT: &str = r#"You are a test outcome judge. You are given one test step, its expected result, and the visible text of the page after the step's action ran. Decide whether the expected result holds.

Respond with a single JSON object and nothing else:

{"status": "passed", "reason": "<short explanation>"}
{"status": "failed", "reason": "<short explanation>"}

Judge only from the page text you are given. If the evidence is absent or ambiguous, answer "failed"."#;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Passed,
    Failed,
}

/// The judge's answer for one step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Judges a step's expected result against the page text after execution.
pub struct Verifier {
    provider: Arc<dyn ChatProvider>,
}

impl Verifier {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    pub async fn verify(
        &self,
        instruction: &str,
        expected_result: &str,
        page_text: &str,
    ) -> Result<Verdict, EngineError> {
        let request = ChatRequest {
            system: VERIFIER_SYSTEM_PROMPT.to_string(),
            user: build_user_message(instruction, expected_result, page_text),
            screenshot_png: None,
        };

        let content = self.provider.complete_json(&request).await.map_err(|err| {
            match err {
                LlmError::Malformed(msg) => EngineError::VerificationParse(msg),
                other => EngineError::from(other),
            }
        })?;

        let json = extract_json_object(&content).ok_or_else(|| {
            EngineError::VerificationParse(format!("no JSON object in judge response: {content}"))
        })?;

        let verdict: Verdict = serde_json::from_str(&json).map_err(|err| {
            EngineError::VerificationParse(format!("invalid verdict payload: {err}"))
        })?;

        debug!(status = ?verdict.status, "judge verdict");
        Ok(verdict)
    }
}

fn build_user_message(instruction: &str, expected_result: &str, page_text: &str) -> String {
    format!(
        "## Step\n{instruction}\n\n## Expected result\n{expected_result}\n\n## Page text\n{page_text}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScriptedChatProvider;

    #[tokio::test]
    async fn verify_parses_passed_verdict() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_response("{\"status\":\"passed\",\"reason\":\"results shown\"}");
        let verifier = Verifier::new(provider);
        let verdict = verifier
            .verify("Search rust", "Results appear", "10 results for rust")
            .await
            .unwrap();
        assert_eq!(verdict.status, VerdictStatus::Passed);
        assert_eq!(verdict.reason.as_deref(), Some("results shown"));
    }

    #[tokio::test]
    async fn verify_rejects_unparseable_verdict() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_response("looks good to me");
        let verifier = Verifier::new(provider);
        let err = verifier
            .verify("Search rust", "Results appear", "10 results for rust")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::VerificationParse(_)));
    }

    #[tokio::test]
    async fn verify_rejects_unknown_status_value() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_response("{\"status\":\"maybe\"}");
        let verifier = Verifier::new(provider);
        let err = verifier
            .verify("Search rust", "Results appear", "page text")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::VerificationParse(_)));
    }

    #[test]
    fn user_message_contains_all_sections() {
        let message = build_user_message("step", "expected", "text");
        assert!(message.contains("## Step"));
        assert!(message.contains("## Expected result"));
        assert!(message.contains("## Page text"));
    }
}
