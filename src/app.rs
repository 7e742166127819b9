//! Construction of the orchestrator and its collaborators from
//! configuration.

use std::sync::Arc;

use anyhow::Result;

use testwright_engine::{
    EngineSettings, InMemoryCaseRepository, InMemoryRunStore, Orchestrator,
};
use testwright_event_bus::EventHub;
use testwright_llm::{LlmConfig, OpenAiChatClient, Planner, Verifier};

use crate::bridge::ChromiumBrowserFactory;
use crate::config::AppConfig;

pub struct App {
    pub orchestrator: Arc<Orchestrator>,
    pub cases: Arc<InMemoryCaseRepository>,
}

pub fn build(config: &AppConfig) -> Result<App> {
    let provider = Arc::new(OpenAiChatClient::new(LlmConfig {
        api_base: config.model.api_base.clone(),
        api_key: config.model.api_key.clone(),
        model: config.model.name.clone(),
        temperature: config.model.temperature,
        timeout: config.model_timeout(),
    })?);

    let settings = EngineSettings {
        max_steps: config.engine.max_steps,
        settle: config.settle(),
        max_wait: config.max_wait(),
        use_vision: config.model.use_vision,
    };

    let cases = InMemoryCaseRepository::new();
    let orchestrator = Orchestrator::new(
        settings,
        Arc::clone(&cases) as _,
        InMemoryRunStore::new(),
        EventHub::new(),
        Arc::new(ChromiumBrowserFactory::new(&config.browser)),
        Planner::new(Arc::clone(&provider) as _),
        Verifier::new(provider as _),
    );

    Ok(App {
        orchestrator,
        cases,
    })
}
