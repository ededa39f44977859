use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::config::BackendSettings;
use crate::error::BackendError;
use crate::metrics::track_backend_call;
use crate::models::{Assignment, LeadSubmission, Variant};

pub const GET_VARIANTS: &str = "abTest.getVariants";
pub const ASSIGN_VARIANT: &str = "abTest.assignVariant";
pub const TRACK_CONVERSION: &str = "abTest.trackConversion";
pub const SUBMIT_LEAD: &str = "quiz.submitLead";

/// Remote procedures the funnel depends on.
#[async_trait]
pub trait FunnelBackend: Send + Sync {
    async fn get_variants(&self, quiz_id: &str) -> Result<Vec<Variant>, BackendError>;

    async fn assign_variant(&self, assignment: &Assignment) -> Result<(), BackendError>;

    async fn track_conversion(&self, session_id: &str, quiz_id: &str)
        -> Result<(), BackendError>;

    async fn submit_lead(&self, lead: &LeadSubmission) -> Result<(), BackendError>;
}

#[derive(Serialize)]
struct Envelope<'a, I: Serialize> {
    json: &'a I,
}

/// tRPC over HTTP with superjson-style `{"json": ...}` envelopes.
///
/// Queries are `GET {base}/{procedure}?input=...`, mutations are
/// `POST {base}/{procedure}` with the envelope as body.
#[derive(Debug, Clone)]
pub struct TrpcClient {
    http: Client,
    base_url: String,
}

impl TrpcClient {
    pub fn new(settings: &BackendSettings) -> Result<Self, BackendError> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)?;

        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn procedure_url(&self, procedure: &str) -> String {
        format!("{}/{}", self.base_url, procedure)
    }

    async fn query<I, T>(&self, procedure: &str, input: &I) -> Result<T, BackendError>
    where
        I: Serialize + Sync,
        T: DeserializeOwned,
    {
        let input = serde_json::to_string(&Envelope { json: input })
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        debug!("tRPC query {} input={}", procedure, input);

        track_backend_call(procedure, async {
            let response = self
                .http
                .get(self.procedure_url(procedure))
                .query(&[("input", input.as_str())])
                .send()
                .await?;
            read_response(response).await
        })
        .await
    }

    async fn mutate<I>(&self, procedure: &str, input: &I) -> Result<(), BackendError>
    where
        I: Serialize + Sync,
    {
        debug!("tRPC mutation {}", procedure);

        track_backend_call(procedure, async {
            let response = self
                .http
                .post(self.procedure_url(procedure))
                .json(&Envelope { json: input })
                .send()
                .await?;
            read_response::<Value>(response).await.map(|_| ())
        })
        .await
    }
}

#[async_trait]
impl FunnelBackend for TrpcClient {
    async fn get_variants(&self, quiz_id: &str) -> Result<Vec<Variant>, BackendError> {
        self.query(GET_VARIANTS, &json!({ "quizId": quiz_id }))
            .await
    }

    async fn assign_variant(&self, assignment: &Assignment) -> Result<(), BackendError> {
        self.mutate(ASSIGN_VARIANT, assignment).await
    }

    async fn track_conversion(
        &self,
        session_id: &str,
        quiz_id: &str,
    ) -> Result<(), BackendError> {
        self.mutate(
            TRACK_CONVERSION,
            &json!({ "sessionId": session_id, "quizId": quiz_id }),
        )
        .await
    }

    async fn submit_lead(&self, lead: &LeadSubmission) -> Result<(), BackendError> {
        self.mutate(SUBMIT_LEAD, lead).await
    }
}

async fn read_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(BackendError::Server {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    decode_result(&body)
}

/// Pull `T` out of `{"result":{"data":{"json":T}}}` or `{"result":{"data":T}}`.
pub(crate) fn decode_result<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
    let envelope: Value =
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))?;

    if envelope.get("error").is_some() {
        return Err(BackendError::Server {
            status: 200,
            message: error_message(body),
        });
    }

    let data = envelope
        .pointer("/result/data")
        .ok_or_else(|| BackendError::Decode("response has no result.data".to_string()))?;
    let data = data.get("json").unwrap_or(data);

    T::deserialize(data).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Server-provided message from a tRPC error body, if any.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let envelope: Value = serde_json::from_str(body).ok()?;
    envelope
        .pointer("/error/json/message")
        .or_else(|| envelope.pointer("/error/message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_superjson_and_plain_results() {
        let wrapped: Vec<Variant> = decode_result(
            r#"{"result":{"data":{"json":[{"id":1,"quizId":"q","variantName":"A","isControl":1,"isActive":1}]}}}"#,
        )
        .unwrap();
        assert_eq!(wrapped.len(), 1);
        assert!(wrapped[0].is_control);

        let plain: Value = decode_result(r#"{"result":{"data":{"success":true}}}"#).unwrap();
        assert_eq!(plain["success"], true);
    }

    #[test]
    fn missing_data_is_a_decode_error() {
        let result: Result<Value, _> = decode_result(r#"{"result":{}}"#);
        assert!(matches!(result, Err(BackendError::Decode(_))));

        let result: Result<Value, _> = decode_result("<html>");
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }

    #[test]
    fn error_message_reads_both_shapes() {
        assert_eq!(
            error_message(r#"{"error":{"json":{"message":"Phone is invalid","code":-32600}}}"#),
            Some("Phone is invalid".to_string())
        );
        assert_eq!(
            error_message(r#"{"error":{"message":"Internal"}}"#),
            Some("Internal".to_string())
        );
        assert_eq!(error_message(r#"{"error":{"json":{"message":""}}}"#), None);
        assert_eq!(error_message("Bad gateway"), None);
    }

    #[test]
    fn error_body_with_success_status_is_a_server_error() {
        let result: Result<Value, _> =
            decode_result(r#"{"error":{"json":{"message":"Quiz is closed"}}}"#);
        match result {
            Err(err) => assert_eq!(err.server_message(), Some("Quiz is closed")),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn rejects_invalid_base_url() {
        let settings = BackendSettings {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            TrpcClient::new(&settings),
            Err(BackendError::InvalidUrl(_))
        ));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let settings = BackendSettings {
            base_url: "http://localhost:3000/api/trpc/".to_string(),
            ..Default::default()
        };
        let client = TrpcClient::new(&settings).unwrap();
        assert_eq!(
            client.procedure_url(SUBMIT_LEAD),
            "http://localhost:3000/api/trpc/quiz.submitLead"
        );
    }
}
