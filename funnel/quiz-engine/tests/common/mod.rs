#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quiz_funnel::config::Config;
use quiz_funnel::error::{BackendError, SinkError};
use quiz_funnel::models::{Assignment, EventEnvelope, LeadSubmission, Variant};
use quiz_funnel::services::analytics_service::{Analytics, AnalyticsSink};
use quiz_funnel::services::backend_client::FunnelBackend;
use quiz_funnel::services::content_registry::ContentRegistry;
use quiz_funnel::services::quiz_flow::QuizFlow;
use quiz_funnel::storage::{ClientStorage, MemoryStorage};
use quiz_funnel::{FunnelState, QuizOpening};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// In-process stand-in for the RPC backend.
#[derive(Default)]
pub struct FakeBackend {
    pub variants: Mutex<Vec<Variant>>,
    pub fail_variants: Mutex<bool>,
    /// Each entry fails one submission; `Some` carries a server message.
    pub submit_failures: Mutex<VecDeque<Option<String>>>,
    pub assignments: Mutex<Vec<Assignment>>,
    pub conversions: Mutex<Vec<(String, String)>>,
    pub leads: Mutex<Vec<LeadSubmission>>,
    pub variant_fetches: Mutex<usize>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_variants(variants: Vec<Variant>) -> Arc<Self> {
        let backend = Self::default();
        *backend.variants.lock().unwrap() = variants;
        Arc::new(backend)
    }

    pub fn fail_next_submit(&self, message: Option<&str>) {
        self.submit_failures
            .lock()
            .unwrap()
            .push_back(message.map(str::to_string));
    }

    pub fn assignments(&self) -> Vec<Assignment> {
        self.assignments.lock().unwrap().clone()
    }

    pub fn conversions(&self) -> Vec<(String, String)> {
        self.conversions.lock().unwrap().clone()
    }

    pub fn leads(&self) -> Vec<LeadSubmission> {
        self.leads.lock().unwrap().clone()
    }
}

#[async_trait]
impl FunnelBackend for FakeBackend {
    async fn get_variants(&self, _quiz_id: &str) -> Result<Vec<Variant>, BackendError> {
        *self.variant_fetches.lock().unwrap() += 1;
        if *self.fail_variants.lock().unwrap() {
            return Err(BackendError::Server {
                status: 503,
                message: None,
            });
        }
        Ok(self.variants.lock().unwrap().clone())
    }

    async fn assign_variant(&self, assignment: &Assignment) -> Result<(), BackendError> {
        self.assignments.lock().unwrap().push(assignment.clone());
        Ok(())
    }

    async fn track_conversion(
        &self,
        session_id: &str,
        quiz_id: &str,
    ) -> Result<(), BackendError> {
        self.conversions
            .lock()
            .unwrap()
            .push((session_id.to_string(), quiz_id.to_string()));
        Ok(())
    }

    async fn submit_lead(&self, lead: &LeadSubmission) -> Result<(), BackendError> {
        if let Some(failure) = self.submit_failures.lock().unwrap().pop_front() {
            return Err(BackendError::Server {
                status: 400,
                message: failure,
            });
        }
        self.leads.lock().unwrap().push(lead.clone());
        Ok(())
    }
}

/// Sink that keeps every envelope it is given.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.kind())
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

impl AnalyticsSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn track(&self, envelope: &EventEnvelope) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

pub struct FailingSink;

impl AnalyticsSink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn track(&self, _envelope: &EventEnvelope) -> Result<(), SinkError> {
        Err(SinkError::Rejected("sink is down".to_string()))
    }
}

/// Default config with timings short enough for tests.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.flow.auto_advance_ms = 10;
    config.flow.redirect_delay_ms = 0;
    config
}

pub struct TestFunnel {
    pub state: FunnelState,
    pub storage: Arc<MemoryStorage>,
    pub backend: Arc<FakeBackend>,
    pub sink: Arc<RecordingSink>,
}

pub fn create_test_funnel(backend: Arc<FakeBackend>) -> TestFunnel {
    create_test_funnel_with(backend, Analytics::default())
}

/// Funnel over the built-in content with a recording sink appended to `analytics`.
pub fn create_test_funnel_with(backend: Arc<FakeBackend>, analytics: Analytics) -> TestFunnel {
    init_tracing();

    let storage = Arc::new(MemoryStorage::new());
    let sink = RecordingSink::new();
    let registry = ContentRegistry::builtin().expect("built-in content should load");

    let state = FunnelState::with_parts(
        test_config(),
        storage.clone() as Arc<dyn ClientStorage>,
        Arc::new(registry),
        backend.clone() as Arc<dyn FunnelBackend>,
        analytics.with_sink(sink.clone()),
    );

    TestFunnel {
        state,
        storage,
        backend,
        sink,
    }
}

pub async fn open(funnel: &TestFunnel, quiz_id: &str, language: &str) -> QuizFlow {
    match funnel.state.open_quiz(quiz_id, language, None).await {
        QuizOpening::Ready(flow) => flow,
        QuizOpening::NotFound { quiz_id } => panic!("quiz '{}' should exist", quiz_id),
    }
}

/// Answer every question with its first option.
pub async fn answer_all(flow: &mut QuizFlow) {
    let questions = flow.snapshot().await.quiz().content.questions.clone();
    for question in questions {
        flow.select_answer(&question.options[0]).await.unwrap();
        flow.wait_for_advance().await.unwrap();
    }
}

/// Poll until `check` holds; background reports are detached tasks.
pub async fn wait_until<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}
