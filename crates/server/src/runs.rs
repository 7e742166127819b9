use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::instrument;

use testwright_core_types::{CaseId, EngineError, RunEvent, RunId, RunRecord, TestCase};
use testwright_engine::Subscription;

use crate::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/cases", get(list_cases_handler))
        .route("/api/runs", post(create_run_handler))
        .route("/api/runs/:run_id", get(get_run_handler))
        .route("/api/runs/:run_id/stop", post(stop_run_handler))
        .route("/api/runs/:run_id/events", get(run_events_sse_handler))
}

fn error_response(err: EngineError) -> Response {
    let status = match err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "success": false, "error": err.to_string() })),
    )
        .into_response()
}

#[derive(Serialize)]
struct CaseListResponse {
    success: bool,
    cases: Vec<TestCase>,
}

#[instrument(name = "api.cases.list", skip(state))]
async fn list_cases_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut cases = state.cases.list().await;
    cases.sort_by(|a, b| a.name.cmp(&b.name));
    Json(CaseListResponse {
        success: true,
        cases,
    })
}

#[derive(Deserialize)]
struct CreateRunRequest {
    case_id: CaseId,
}

#[derive(Serialize)]
struct CreateRunResponse {
    success: bool,
    run_id: RunId,
}

#[instrument(name = "api.runs.create", skip(state, request))]
async fn create_run_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> Response {
    match state.orchestrator.start(&request.case_id).await {
        Ok(run_id) => (
            StatusCode::ACCEPTED,
            Json(CreateRunResponse {
                success: true,
                run_id,
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Serialize)]
struct RunDetailResponse {
    success: bool,
    run: RunRecord,
}

#[instrument(name = "api.runs.detail", skip(state))]
async fn get_run_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Response {
    match state.orchestrator.run_record(&RunId(run_id)).await {
        Some(run) => Json(RunDetailResponse { success: true, run }).into_response(),
        None => error_response(EngineError::NotFound("run".to_string())),
    }
}

#[instrument(name = "api.runs.stop", skip(state))]
async fn stop_run_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Response {
    match state.orchestrator.stop(&RunId(run_id)).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err) => error_response(err),
    }
}

#[instrument(name = "api.runs.events", skip(state))]
async fn run_events_sse_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Response {
    let run_id = RunId(run_id);
    let subscription = match state.orchestrator.subscribe(&run_id).await {
        Ok(subscription) => subscription,
        Err(err) => return error_response(err),
    };

    let stream = stream! {
        match subscription {
            Subscription::Finished { status } => {
                yield Ok::<Event, Infallible>(event_from(&RunEvent::Status(status)));
            }
            Subscription::Live { status, mut receiver } => {
                // Current status first, so late subscribers are never blind.
                yield Ok(event_from(&RunEvent::Status(status)));
                loop {
                    match receiver.recv().await {
                        Ok(event) => yield Ok(event_from(&event)),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    };

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
        .into_response()
}

fn event_from(event: &RunEvent) -> Event {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.kind()).data(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    use testwright_core_types::Step;
    use testwright_engine::{
        EngineSettings, InMemoryCaseRepository, InMemoryRunStore, Orchestrator,
    };
    use testwright_event_bus::EventHub;
    use testwright_llm::{Planner, ScriptedChatProvider, Verifier};

    fn test_state() -> (AppState, CaseId) {
        let cases = InMemoryCaseRepository::new();
        let case = TestCase {
            id: CaseId::new(),
            name: "demo".to_string(),
            url: "https://example.com".to_string(),
            steps: vec![Step {
                id: testwright_core_types::StepId::new(),
                order: 1,
                instruction: "do nothing".to_string(),
                expected_result: None,
            }],
        };
        let case_id = case.id.clone();
        cases.insert(case);

        let provider = Arc::new(ScriptedChatProvider::new());
        let orchestrator = Orchestrator::new(
            EngineSettings::default(),
            Arc::clone(&cases) as Arc<dyn testwright_engine::CaseRepository>,
            InMemoryRunStore::new(),
            EventHub::new(),
            Arc::new(NoBrowser),
            Planner::new(Arc::clone(&provider) as _),
            Verifier::new(provider as _),
        );

        (
            AppState {
                orchestrator,
                cases,
            },
            case_id,
        )
    }

    struct NoBrowser;

    #[async_trait::async_trait]
    impl testwright_engine::BrowserFactory for NoBrowser {
        async fn acquire(
            &self,
        ) -> Result<Arc<dyn testwright_engine::PageDriver>, EngineError> {
            Err(EngineError::Browser("no browser in tests".to_string()))
        }
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let (state, _) = test_state();
        let router = crate::build_router(state);
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn listing_cases_returns_seeded_case() {
        let (state, case_id) = test_state();
        let router = crate::build_router(state);
        let response = router
            .oneshot(Request::get("/api/cases").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["cases"][0]["id"], case_id.to_string());
    }

    #[tokio::test]
    async fn creating_a_run_for_unknown_case_is_404() {
        let (state, _) = test_state();
        let router = crate::build_router(state);
        let response = router
            .oneshot(
                Request::post("/api/runs")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"case_id":"missing"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn creating_a_run_returns_accepted_with_run_id() {
        let (state, case_id) = test_state();
        let router = crate::build_router(state);
        let body = serde_json::to_string(&json!({ "case_id": case_id.0 })).unwrap();
        let response = router
            .oneshot(
                Request::post("/api/runs")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["success"], true);
        assert!(value["run_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn stopping_an_unknown_run_is_404() {
        let (state, _) = test_state();
        let router = crate::build_router(state);
        let response = router
            .oneshot(
                Request::post("/api/runs/missing/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn events_for_unknown_run_are_404() {
        let (state, _) = test_state();
        let router = crate::build_router(state);
        let response = router
            .oneshot(
                Request::get("/api/runs/missing/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
