//! The Testwright execution engine: page snapshotting, LLM-planned action
//! execution with tiered fallbacks, outcome verification and the run
//! orchestrator that ties them together.

mod emitter;
mod executor;
mod orchestrator;
mod ports;
mod snapshot;
mod store;

#[cfg(test)]
pub(crate) mod fakes;

pub use emitter::RunEmitter;
pub use executor::execute_action;
pub use orchestrator::{EngineSettings, Orchestrator, Subscription};
pub use ports::{BrowserFactory, CaseRepository, InMemoryCaseRepository, PageDriver};
pub use snapshot::{capture_elements, capture_verification_text, VERIFICATION_TEXT_BUDGET};
pub use store::{InMemoryRunStore, RunStore};
