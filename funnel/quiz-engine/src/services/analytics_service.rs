use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::AnalyticsSettings;
use crate::error::SinkError;
use crate::metrics::record_sink_delivery;
use crate::models::{EventEnvelope, FunnelEvent};
use crate::services::spawn_best_effort;

/// A tracking destination for funnel events.
///
/// `track` must return quickly: network delivery happens in the background
/// and is never retried.
pub trait AnalyticsSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn track(&self, envelope: &EventEnvelope) -> Result<(), SinkError>;
}

/// Fans every event out to each sink independently.
#[derive(Clone, Default)]
pub struct Analytics {
    sinks: Vec<Arc<dyn AnalyticsSink>>,
}

impl Analytics {
    pub fn new(sinks: Vec<Arc<dyn AnalyticsSink>>) -> Self {
        Self { sinks }
    }

    /// Meta pixel and GA4 sinks built from settings; missing ids mean mock mode.
    pub fn from_settings(settings: &AnalyticsSettings, http: Client) -> Self {
        let meta: Arc<dyn AnalyticsSink> = Arc::new(MetaPixelSink::new(settings, http.clone()));
        let ga4: Arc<dyn AnalyticsSink> = Arc::new(Ga4Sink::new(settings, http));
        Self::new(vec![meta, ga4])
    }

    pub fn with_sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }

    pub fn emit(&self, session_id: &str, event: FunnelEvent) {
        let envelope = EventEnvelope::new(session_id, event);
        let kind = envelope.event.kind();

        for sink in &self.sinks {
            match sink.track(&envelope) {
                Ok(()) => record_sink_delivery(kind, sink.name(), true),
                Err(e) => {
                    warn!("{} sink failed to track {}: {}", sink.name(), kind, e);
                    record_sink_delivery(kind, sink.name(), false);
                }
            }
        }
    }
}

/// Meta pixel event name and custom data; None for events the pixel skips.
pub fn meta_event(event: &FunnelEvent) -> Option<(&'static str, Value)> {
    match event {
        FunnelEvent::QuizStarted { quiz_id, .. } => Some((
            "Lead",
            json!({ "content_name": quiz_id, "content_category": "quiz_start" }),
        )),
        FunnelEvent::StepCompleted {
            quiz_id,
            step,
            total_steps,
            ..
        } => Some((
            "ViewContent",
            json!({
                "content_name": quiz_id,
                "content_category": "quiz_progress",
                "step": step,
                "total_steps": total_steps,
            }),
        )),
        FunnelEvent::QuizCompleted { quiz_id, .. } => Some((
            "CompleteRegistration",
            json!({ "content_name": quiz_id, "content_category": "quiz_complete" }),
        )),
        FunnelEvent::FormSubmitted { quiz_id, .. } => Some((
            "Lead",
            json!({
                "content_name": quiz_id,
                "content_category": "form_submit",
                "value": 0,
                "currency": "USD",
            }),
        )),
        FunnelEvent::FormViewed { .. } | FunnelEvent::DroppedOff { .. } => None,
    }
}

/// GA4 event name and params.
pub fn ga4_event(event: &FunnelEvent) -> (&'static str, Value) {
    match event {
        FunnelEvent::QuizStarted { quiz_id, language } => (
            "quiz_start",
            json!({ "quiz_name": quiz_id, "language": language }),
        ),
        FunnelEvent::StepCompleted {
            quiz_id,
            step,
            total_steps,
            answer,
        } => (
            "quiz_step",
            json!({
                "quiz_name": quiz_id,
                "step_number": step,
                "total_steps": total_steps,
                "answer": answer,
            }),
        ),
        FunnelEvent::QuizCompleted { quiz_id, language } => (
            "quiz_complete",
            json!({ "quiz_name": quiz_id, "language": language }),
        ),
        FunnelEvent::FormViewed { quiz_id } => ("form_view", json!({ "quiz_name": quiz_id })),
        FunnelEvent::FormSubmitted { quiz_id, language } => (
            "generate_lead",
            json!({ "quiz_name": quiz_id, "language": language, "value": 1 }),
        ),
        FunnelEvent::DroppedOff {
            quiz_id,
            step,
            total_steps,
        } => (
            "quiz_drop_off",
            json!({
                "quiz_name": quiz_id,
                "step_number": step,
                "total_steps": total_steps,
                "drop_off_rate": drop_off_rate(*step, *total_steps),
            }),
        ),
    }
}

fn drop_off_rate(step: usize, total_steps: usize) -> String {
    if total_steps == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", step as f64 / total_steps as f64 * 100.0)
}

fn hash_identifier(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Meta Conversions API sink.
pub struct MetaPixelSink {
    pixel_id: Option<String>,
    access_token: Option<String>,
    endpoint: String,
    http: Client,
}

impl MetaPixelSink {
    pub fn new(settings: &AnalyticsSettings, http: Client) -> Self {
        let pixel_id = settings
            .meta_pixel_id
            .clone()
            .filter(|id| !id.trim().is_empty());
        if pixel_id.is_none() {
            info!("Meta pixel id not configured, pixel events will only be logged");
        }
        Self {
            pixel_id,
            access_token: settings.meta_access_token.clone(),
            endpoint: settings.meta_endpoint.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.pixel_id.is_none()
    }

    fn payload(envelope: &EventEnvelope, event_name: &str, custom_data: Value) -> Value {
        json!({
            "data": [{
                "event_name": event_name,
                "event_time": envelope.occurred_at.timestamp(),
                "event_id": envelope.event_id,
                "action_source": "website",
                "user_data": { "external_id": [hash_identifier(&envelope.session_id)] },
                "custom_data": custom_data,
            }]
        })
    }
}

impl AnalyticsSink for MetaPixelSink {
    fn name(&self) -> &'static str {
        "meta_pixel"
    }

    fn track(&self, envelope: &EventEnvelope) -> Result<(), SinkError> {
        let Some((event_name, custom_data)) = meta_event(&envelope.event) else {
            return Ok(());
        };

        let Some(pixel_id) = self.pixel_id.as_deref() else {
            debug!("[Meta Pixel mock] {} {}", event_name, custom_data);
            return Ok(());
        };

        let body = Self::payload(envelope, event_name, custom_data);
        let url = format!("{}/{}/events", self.endpoint, pixel_id);
        let request = self
            .http
            .post(url)
            .query(&[("access_token", self.access_token.as_deref().unwrap_or_default())])
            .json(&body);

        spawn_best_effort("meta pixel delivery", async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!("Meta pixel rejected event: {}", response.status()),
                Err(e) => warn!("Meta pixel delivery failed: {}", e),
            }
        })
        .map(|_| ())
        .ok_or(SinkError::NoRuntime)
    }
}

/// GA4 Measurement Protocol sink.
pub struct Ga4Sink {
    measurement_id: Option<String>,
    api_secret: Option<String>,
    endpoint: String,
    http: Client,
}

impl Ga4Sink {
    pub fn new(settings: &AnalyticsSettings, http: Client) -> Self {
        let measurement_id = settings
            .ga4_measurement_id
            .clone()
            .filter(|id| !id.trim().is_empty());
        if measurement_id.is_none() {
            info!("GA4 measurement id not configured, GA4 events will only be logged");
        }
        Self {
            measurement_id,
            api_secret: settings.ga4_api_secret.clone(),
            endpoint: settings.ga4_endpoint.clone(),
            http,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.measurement_id.is_none()
    }

    fn payload(envelope: &EventEnvelope, name: &str, params: Value) -> Value {
        json!({
            "client_id": envelope.session_id,
            "timestamp_micros": envelope.occurred_at.timestamp_micros(),
            "events": [{ "name": name, "params": params }],
        })
    }
}

impl AnalyticsSink for Ga4Sink {
    fn name(&self) -> &'static str {
        "ga4"
    }

    fn track(&self, envelope: &EventEnvelope) -> Result<(), SinkError> {
        let (name, params) = ga4_event(&envelope.event);

        let Some(measurement_id) = self.measurement_id.as_deref() else {
            debug!("[GA4 mock] {} {}", name, params);
            return Ok(());
        };

        let body = Self::payload(envelope, name, params);
        let request = self
            .http
            .post(&self.endpoint)
            .query(&[
                ("measurement_id", measurement_id),
                ("api_secret", self.api_secret.as_deref().unwrap_or_default()),
            ])
            .json(&body);

        spawn_best_effort("ga4 delivery", async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!("GA4 rejected event: {}", response.status()),
                Err(e) => warn!("GA4 delivery failed: {}", e),
            }
        })
        .map(|_| ())
        .ok_or(SinkError::NoRuntime)
    }
}
