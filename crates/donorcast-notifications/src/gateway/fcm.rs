use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::{AccessTokenSource, DeliveryOutcome, MessageTarget, PushGateway, PushMessage};
use crate::error::NotificationError;
use crate::types::MessageContent;

const DEFAULT_API_BASE: &str = "https://fcm.googleapis.com";
const DEFAULT_IID_BASE: &str = "https://iid.googleapis.com";

/// Settings for the FCM HTTP v1 adapter
#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub project_id: String,
    pub api_base: String,
    pub iid_base: String,
    pub timeout: Duration,
    /// Upper bound on in-flight sends during a multicast
    pub multicast_concurrency: usize,
}

impl FcmConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            iid_base: DEFAULT_IID_BASE.to_string(),
            timeout: Duration::from_secs(10),
            multicast_concurrency: 16,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_iid_base(mut self, base: impl Into<String>) -> Self {
        self.iid_base = base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_multicast_concurrency(mut self, concurrency: usize) -> Self {
        self.multicast_concurrency = concurrency.max(1);
        self
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.api_base.trim_end_matches('/'),
            self.project_id
        )
    }

    fn iid_url(&self, action: &str) -> String {
        format!("{}/iid/v1:{}", self.iid_base.trim_end_matches('/'), action)
    }
}

/// Firebase Cloud Messaging over the HTTP v1 API
pub struct FcmGateway {
    http_client: Client,
    config: FcmConfig,
    auth: Arc<dyn AccessTokenSource>,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    results: Vec<BatchResult>,
}

#[derive(Deserialize)]
struct BatchResult {
    #[serde(default)]
    error: Option<String>,
}

impl FcmGateway {
    pub fn new(
        config: FcmConfig,
        auth: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, NotificationError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotificationError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            http_client,
            config,
            auth,
        })
    }

    fn message_body(message: &PushMessage) -> Value {
        let mut body = json!({
            "notification": {
                "title": message.content.title,
                "body": message.content.body,
            },
        });
        match &message.target {
            MessageTarget::Token(token) => body["token"] = json!(token),
            MessageTarget::Topic(topic) => body["topic"] = json!(topic_name(topic)),
        }
        if !message.content.data.is_empty() {
            body["data"] = json!(message.content.data);
        }
        json!({ "message": body })
    }

    async fn send_with_token(
        &self,
        access_token: &str,
        message: &PushMessage,
    ) -> Result<String, NotificationError> {
        let response = self
            .http_client
            .post(self.config.send_url())
            .bearer_auth(access_token)
            .json(&Self::message_body(message))
            .send()
            .await
            .map_err(|e| NotificationError::gateway(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| NotificationError::gateway(format!("invalid send response: {e}")))?;
        Ok(sent.name)
    }

    async fn batch_topic_call(
        &self,
        action: &str,
        tokens: &[String],
        topic: &str,
    ) -> Result<(), NotificationError> {
        let access_token = self.auth.access_token().await?;
        let response = self
            .http_client
            .post(self.config.iid_url(action))
            .bearer_auth(access_token)
            .header("access_token_auth", "true")
            .json(&json!({
                "to": topic_path(topic),
                "registration_tokens": tokens,
            }))
            .send()
            .await
            .map_err(|e| NotificationError::gateway(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        // Per-token failures do not fail the call
        let batch: BatchResponse = match response.json().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(topic, action, error = %e, "Unreadable topic management response");
                BatchResponse {
                    results: Vec::new(),
                }
            }
        };
        for (index, result) in batch.results.iter().enumerate() {
            if let Some(error) = &result.error {
                warn!(topic, action, index, error = %error, "Topic management failed for token");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    #[instrument(skip_all)]
    async fn send(&self, message: &PushMessage) -> Result<String, NotificationError> {
        let access_token = self.auth.access_token().await?;
        let message_id = self.send_with_token(&access_token, message).await?;
        debug!(message_id = %message_id, "FCM message accepted");
        Ok(message_id)
    }

    #[instrument(skip_all, fields(tokens = tokens.len()))]
    async fn send_multicast(
        &self,
        tokens: &[String],
        content: &MessageContent,
    ) -> Result<Vec<DeliveryOutcome>, NotificationError> {
        let access_token = self.auth.access_token().await?;
        let access_token = access_token.as_str();

        // `buffered` yields in submission order
        let outcomes = stream::iter(tokens.iter().cloned())
            .map(|token| async move {
                let message = PushMessage::to_token(token, content.clone());
                match self.send_with_token(access_token, &message).await {
                    Ok(message_id) => DeliveryOutcome::Delivered { message_id },
                    Err(e) => DeliveryOutcome::Failed {
                        error: e.to_string(),
                    },
                }
            })
            .buffered(self.config.multicast_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        Ok(outcomes)
    }

    async fn subscribe(&self, tokens: &[String], topic: &str) -> Result<(), NotificationError> {
        self.batch_topic_call("batchAdd", tokens, topic).await
    }

    async fn unsubscribe(&self, tokens: &[String], topic: &str) -> Result<(), NotificationError> {
        self.batch_topic_call("batchRemove", tokens, topic).await
    }
}

/// Topic name without the `/topics/` prefix, as the v1 send API expects
fn topic_name(topic: &str) -> &str {
    topic.strip_prefix("/topics/").unwrap_or(topic)
}

/// Topic path with the `/topics/` prefix, as the Instance ID API expects
fn topic_path(topic: &str) -> String {
    format!("/topics/{}", topic_name(topic))
}

async fn error_from_response(response: Response) -> NotificationError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorEnvelope>(&text)
        .ok()
        .map(|envelope| {
            let code = envelope.error.status.unwrap_or_else(|| status.to_string());
            match envelope.error.message {
                Some(message) => format!("{code}: {message}"),
                None => code,
            }
        })
        .unwrap_or_else(|| format!("{status}: {text}"));
    NotificationError::gateway(detail)
}
