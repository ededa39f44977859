use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::services::analytics_service::Analytics;
use crate::services::backend_client::{FunnelBackend, TrpcClient};
use crate::services::content_registry::ContentRegistry;
use crate::services::experiment_service::ExperimentService;
use crate::services::quiz_flow::{FlowServices, QuizFlow};
use crate::services::session_service::SessionService;
use crate::storage::{ClientStorage, FileStorage, MemoryStorage};
use crate::utils::utm::capture_utm;

pub mod analytics_service;
pub mod backend_client;
pub mod content_registry;
pub mod experiment_service;
pub mod quiz_flow;
pub mod session_service;

/// Run a fire-and-forget task on the current runtime, if there is one.
pub(crate) fn spawn_best_effort<F>(what: &'static str, task: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Some(handle.spawn(task)),
        Err(_) => {
            warn!("No async runtime available, skipping {}", what);
            None
        }
    }
}

/// Result of opening a quiz page.
pub enum QuizOpening {
    Ready(QuizFlow),
    NotFound { quiz_id: String },
}

impl QuizOpening {
    pub fn into_flow(self) -> Option<QuizFlow> {
        match self {
            QuizOpening::Ready(flow) => Some(flow),
            QuizOpening::NotFound { .. } => None,
        }
    }
}

/// Everything a visitor's client needs, wired once at startup.
pub struct FunnelState {
    pub config: Config,
    pub storage: Arc<dyn ClientStorage>,
    pub registry: Arc<ContentRegistry>,
    pub backend: Arc<dyn FunnelBackend>,
    pub analytics: Analytics,
    pub sessions: SessionService,
    pub experiments: Arc<ExperimentService>,
}

impl FunnelState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let storage: Arc<dyn ClientStorage> = match &config.storage.path {
            Some(path) => {
                info!("Using client storage at {}", path.display());
                Arc::new(FileStorage::new(path))
            }
            None => {
                info!("Using in-memory client storage");
                Arc::new(MemoryStorage::new())
            }
        };

        let registry = match &config.content.path {
            Some(path) => ContentRegistry::from_path(path)
                .with_context(|| format!("Failed to load quiz content from {}", path.display()))?,
            None => ContentRegistry::builtin().context("Failed to load built-in quiz content")?,
        };

        let backend = TrpcClient::new(&config.backend).context("Failed to create backend client")?;
        info!("Backend RPC endpoint: {}", backend.base_url());

        let http = reqwest::Client::builder()
            .timeout(config.backend.request_timeout())
            .build()
            .context("Failed to create analytics HTTP client")?;
        let analytics = Analytics::from_settings(&config.analytics, http);

        Ok(Self::with_parts(
            config,
            storage,
            Arc::new(registry),
            Arc::new(backend),
            analytics,
        ))
    }

    /// Wire pre-built collaborators.
    pub fn with_parts(
        config: Config,
        storage: Arc<dyn ClientStorage>,
        registry: Arc<ContentRegistry>,
        backend: Arc<dyn FunnelBackend>,
        analytics: Analytics,
    ) -> Self {
        let sessions = SessionService::new(Arc::clone(&storage));
        let experiments = Arc::new(ExperimentService::new(
            Arc::clone(&storage),
            Arc::clone(&backend),
        ));

        Self {
            config,
            storage,
            registry,
            backend,
            analytics,
            sessions,
            experiments,
        }
    }

    /// Open a quiz page: resolve content, settle the experiment variant,
    /// capture attribution, and start the flow.
    pub async fn open_quiz(
        &self,
        quiz_id: &str,
        language: &str,
        landing_url: Option<&str>,
    ) -> QuizOpening {
        let session_id = self.sessions.get_or_create_session_id();

        let Some(mut quiz) = self.registry.resolve(quiz_id, language).found() else {
            info!("Quiz '{}' not found", quiz_id);
            return QuizOpening::NotFound {
                quiz_id: quiz_id.to_string(),
            };
        };

        let active = self.experiments.ensure_assignment(&session_id, quiz_id).await;
        if let Some(variant) = active.as_ref().and_then(|a| a.variant.as_ref()) {
            quiz = quiz.with_variant(variant);
        }

        let utm = capture_utm(self.storage.as_ref(), landing_url);

        QuizOpening::Ready(QuizFlow::start(
            quiz,
            session_id,
            utm,
            active.map(|a| a.assignment),
            self.flow_services(),
        ))
    }

    fn flow_services(&self) -> FlowServices {
        FlowServices {
            analytics: self.analytics.clone(),
            backend: Arc::clone(&self.backend),
            experiments: Arc::clone(&self.experiments),
            settings: self.config.flow.clone(),
        }
    }
}
