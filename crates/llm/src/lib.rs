//! LLM integration: an OpenAI-compatible chat client plus the two callers
//! the engine needs, the per-step action [`Planner`] and the outcome
//! [`Verifier`].

mod client;
mod planner;
mod utils;
mod verifier;

pub use client::{ChatProvider, ChatRequest, LlmConfig, OpenAiChatClient, ScriptedChatProvider};
pub use planner::Planner;
pub use utils::extract_json_object;
pub use verifier::{Verdict, VerdictStatus, Verifier};

use thiserror::Error;

use testwright_core_types::EngineError;

#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Transport(String),

    #[error("llm response malformed: {0}")]
    Malformed(String),
}

impl From<LlmError> for EngineError {
    fn from(err: LlmError) -> Self {
        EngineError::Llm(err.to_string())
    }
}
