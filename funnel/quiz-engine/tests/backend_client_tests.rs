use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use quiz_funnel::config::BackendSettings;
use quiz_funnel::error::BackendError;
use quiz_funnel::models::{Assignment, SubmitOutcome};
use quiz_funnel::services::analytics_service::Analytics;
use quiz_funnel::services::backend_client::{FunnelBackend, TrpcClient};
use quiz_funnel::services::content_registry::ContentRegistry;
use quiz_funnel::services::quiz_flow::Step;
use quiz_funnel::storage::MemoryStorage;
use quiz_funnel::FunnelState;

mod common;
use common::{answer_all, init_tracing, test_config, wait_until, RecordingSink};

/// Requests seen by the stub, as `(procedure, input)`.
#[derive(Clone, Default)]
struct StubState {
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl StubState {
    fn record(&self, procedure: &str, input: Value) {
        self.calls
            .lock()
            .unwrap()
            .push((procedure.to_string(), input));
    }

    fn calls(&self, procedure: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == procedure)
            .map(|(_, input)| input.clone())
            .collect()
    }
}

fn data(value: Value) -> Json<Value> {
    Json(json!({ "result": { "data": { "json": value } } }))
}

async fn get_variants(
    State(stub): State<StubState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let input: Value = params
        .get("input")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or(Value::Null);
    stub.record("abTest.getVariants", input);

    data(json!([
        {
            "id": 11,
            "quizId": "meta-furniture",
            "variantName": "Control",
            "isControl": 1,
            "trafficPercentage": 100,
            "isActive": 1,
            "title": null,
            "subtitle": null,
            "questions": null
        },
        {
            "id": 12,
            "quizId": "meta-furniture",
            "variantName": "Paused",
            "isControl": 0,
            "trafficPercentage": 0,
            "isActive": 0
        }
    ]))
}

async fn assign_variant(State(stub): State<StubState>, Json(body): Json<Value>) -> Json<Value> {
    stub.record("abTest.assignVariant", body);
    data(json!({ "success": true }))
}

async fn track_conversion(State(stub): State<StubState>, Json(body): Json<Value>) -> Json<Value> {
    stub.record("abTest.trackConversion", body);
    data(json!({ "success": true }))
}

async fn submit_lead(
    State(stub): State<StubState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let rejected = body["json"]["phone"] == "000";
    stub.record("quiz.submitLead", body);

    if rejected {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": {
                    "json": {
                        "message": "Phone number looks invalid",
                        "code": -32600,
                        "data": { "code": "BAD_REQUEST", "httpStatus": 400 }
                    }
                }
            })),
        );
    }
    (StatusCode::OK, data(json!({ "success": true })))
}

async fn spawn_stub() -> (SocketAddr, StubState) {
    let stub = StubState::default();
    let app = Router::new()
        .route("/api/trpc/abTest.getVariants", get(get_variants))
        .route("/api/trpc/abTest.assignVariant", post(assign_variant))
        .route("/api/trpc/abTest.trackConversion", post(track_conversion))
        .route("/api/trpc/quiz.submitLead", post(submit_lead))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, stub)
}

fn client(addr: SocketAddr) -> TrpcClient {
    TrpcClient::new(&BackendSettings {
        base_url: format!("http://{}/api/trpc/", addr),
        request_timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn test_get_variants_sends_query_input() {
    init_tracing();
    let (addr, stub) = spawn_stub().await;
    let client = client(addr);
    assert_eq!(client.base_url(), format!("http://{}/api/trpc", addr));

    let variants = tokio_test::assert_ok!(client.get_variants("meta-furniture").await);
    assert_eq!(variants.len(), 2);
    assert!(variants[0].is_control);
    assert_eq!(variants[0].traffic_percentage, Some(100));
    assert!(!variants[1].is_active);

    assert_eq!(
        stub.calls("abTest.getVariants"),
        vec![json!({ "json": { "quizId": "meta-furniture" } })]
    );
}

#[tokio::test]
async fn test_mutations_wrap_input_in_json_envelope() {
    init_tracing();
    let (addr, stub) = spawn_stub().await;
    let client = client(addr);

    let assignment = Assignment {
        session_id: "session_abc".to_string(),
        quiz_id: "meta-furniture".to_string(),
        variant_id: 11,
        variant_name: "Control".to_string(),
    };
    tokio_test::assert_ok!(client.assign_variant(&assignment).await);
    tokio_test::assert_ok!(client.track_conversion("session_abc", "meta-furniture").await);

    assert_eq!(
        stub.calls("abTest.assignVariant"),
        vec![json!({
            "json": {
                "sessionId": "session_abc",
                "quizId": "meta-furniture",
                "variantId": 11,
                "variantName": "Control"
            }
        })]
    );
    assert_eq!(
        stub.calls("abTest.trackConversion"),
        vec![json!({ "json": { "sessionId": "session_abc", "quizId": "meta-furniture" } })]
    );
}

#[tokio::test]
async fn test_unknown_procedure_is_a_server_error() {
    init_tracing();
    let (addr, _stub) = spawn_stub().await;
    let client = TrpcClient::new(&BackendSettings {
        base_url: format!("http://{}/missing", addr),
        request_timeout_secs: 5,
    })
    .unwrap();

    match client.get_variants("meta-furniture").await {
        Err(BackendError::Server { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, None);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_invalid_base_url_is_rejected() {
    let result = TrpcClient::new(&BackendSettings {
        base_url: "not a url".to_string(),
        request_timeout_secs: 5,
    });
    assert!(matches!(result, Err(BackendError::InvalidUrl(_))));
}

#[tokio::test]
async fn test_quiz_runs_end_to_end_over_http() {
    init_tracing();
    let (addr, stub) = spawn_stub().await;

    let sink = RecordingSink::new();
    let state = FunnelState::with_parts(
        test_config(),
        Arc::new(MemoryStorage::new()),
        Arc::new(ContentRegistry::builtin().unwrap()),
        Arc::new(client(addr)),
        Analytics::default().with_sink(sink.clone()),
    );

    let mut flow = state
        .open_quiz("meta-furniture", "pl", None)
        .await
        .into_flow()
        .unwrap();
    let assignment = flow.assignment().cloned().unwrap();
    assert_eq!(assignment.variant_id, 11);
    assert_eq!(assignment.session_id, flow.session_id());

    answer_all(&mut flow).await;
    flow.update_form(|form| {
        form.name = "Jan Kowalski".to_string();
        form.phone = "000".to_string();
    })
    .await
    .unwrap();

    let outcome = flow.submit().await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Failed {
            message: "Phone number looks invalid".to_string()
        }
    );
    assert_eq!(flow.step().await, Step::Form);

    flow.update_form(|form| form.phone = "+48500100200".to_string())
        .await
        .unwrap();
    let outcome = flow.submit().await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Submitted { .. }));

    let leads = stub.calls("quiz.submitLead");
    assert_eq!(leads.len(), 2);
    let lead = &leads[1]["json"];
    assert_eq!(lead["quizName"], "meta-furniture");
    assert_eq!(lead["language"], "pl");
    assert_eq!(lead["phone"], "+48500100200");
    assert_eq!(lead["telegram"], "");

    let conversions = stub.clone();
    wait_until(move || !conversions.calls("abTest.trackConversion").is_empty()).await;
    let assignments = stub.clone();
    wait_until(move || !assignments.calls("abTest.assignVariant").is_empty()).await;
    assert_eq!(stub.calls("abTest.assignVariant").len(), 1);
    assert_eq!(sink.count("form_submitted"), 1);
}
