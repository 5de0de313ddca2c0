use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::NotificationError;
use crate::gateway::{DeliveryOutcome, PushGateway, PushMessage};
use crate::store::{AuditLog, TokenStore};
use crate::topics::BloodRequest;
use crate::types::{MessageContent, NotificationKind, NotificationRecord, NotificationTarget};

/// Result of a single-user send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectDelivery {
    pub user_id: String,
    pub message_id: String,
}

/// Result of a topic or blood request send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDelivery {
    pub topic: String,
    pub message_id: String,
}

/// Per-user outcome of a multicast send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub user_id: String,
    pub outcome: DeliveryOutcome,
}

/// Aggregate result of a multicast send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastDelivery {
    pub batch_id: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_count: usize,
    /// In the order the user ids were requested, skipped ids omitted
    pub outcomes: Vec<TargetOutcome>,
}

/// Resolves targets, submits messages to the push gateway and writes the audit trail
pub struct NotificationDispatcher {
    tokens: Arc<dyn TokenStore>,
    audit: Arc<dyn AuditLog>,
    gateway: Arc<dyn PushGateway>,
}

impl NotificationDispatcher {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        audit: Arc<dyn AuditLog>,
        gateway: Arc<dyn PushGateway>,
    ) -> Self {
        Self {
            tokens,
            audit,
            gateway,
        }
    }

    #[instrument(skip(self, content), fields(user_id = %user_id))]
    pub async fn send_to_user(
        &self,
        user_id: &str,
        content: MessageContent,
    ) -> Result<DirectDelivery, NotificationError> {
        require_non_blank(user_id, "userId is required")?;
        let token = self.tokens.lookup_token(user_id).await?.require()?;

        let message = PushMessage::to_token(token.clone(), content);
        let message_id = self.gateway.send(&message).await?;

        let target = NotificationTarget::User {
            user_id: user_id.to_string(),
            fcm_token: token,
            batch_id: None,
        };
        self.audit
            .append(NotificationRecord::delivered(
                NotificationKind::Direct,
                target,
                &message.content,
                message_id.clone(),
            ))
            .await?;

        info!(message_id = %message_id, "Notification sent to user");
        Ok(DirectDelivery {
            user_id: user_id.to_string(),
            message_id,
        })
    }

    #[instrument(skip(self, user_ids, content), fields(requested = user_ids.len()))]
    pub async fn send_to_users(
        &self,
        user_ids: &[String],
        content: MessageContent,
    ) -> Result<MulticastDelivery, NotificationError> {
        if user_ids.is_empty() {
            return Err(NotificationError::validation(
                "userIds, title, and body are required",
            ));
        }

        // (user id, token) pairs in request order
        let mut targets: Vec<(String, String)> = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            if let Some(token) = self.tokens.lookup_token(user_id).await?.into_token() {
                targets.push((user_id.clone(), token));
            }
        }
        if targets.is_empty() {
            return Err(NotificationError::NoValidTargets);
        }

        let tokens: Vec<String> = targets.iter().map(|(_, token)| token.clone()).collect();
        let outcomes = self.gateway.send_multicast(&tokens, &content).await?;
        if outcomes.len() != targets.len() {
            return Err(NotificationError::gateway(format!(
                "expected {} multicast outcomes, got {}",
                targets.len(),
                outcomes.len()
            )));
        }

        let batch_id = Uuid::new_v4().to_string();
        let mut records = Vec::with_capacity(targets.len());
        let mut results = Vec::with_capacity(targets.len());
        for ((user_id, token), outcome) in targets.into_iter().zip(outcomes) {
            let target = NotificationTarget::User {
                user_id: user_id.clone(),
                fcm_token: token,
                batch_id: Some(batch_id.clone()),
            };
            let record = match &outcome {
                DeliveryOutcome::Delivered { message_id } => NotificationRecord::delivered(
                    NotificationKind::Multicast,
                    target,
                    &content,
                    message_id.clone(),
                ),
                DeliveryOutcome::Failed { error } => {
                    warn!(user_id = %user_id, error = %error, "Multicast delivery failed for user");
                    NotificationRecord::failed(NotificationKind::Multicast, target, &content, error)
                }
            };
            records.push(record);
            results.push(TargetOutcome { user_id, outcome });
        }
        self.audit.append_all(records).await?;

        let success_count = results.iter().filter(|r| r.outcome.is_success()).count();
        let total_count = results.len();
        let delivery = MulticastDelivery {
            batch_id,
            success_count,
            failure_count: total_count - success_count,
            total_count,
            outcomes: results,
        };

        info!(
            batch_id = %delivery.batch_id,
            success_count = delivery.success_count,
            failure_count = delivery.failure_count,
            "Multicast notification sent"
        );
        Ok(delivery)
    }

    #[instrument(skip(self, content), fields(topic = %topic))]
    pub async fn send_to_topic(
        &self,
        topic: &str,
        content: MessageContent,
    ) -> Result<TopicDelivery, NotificationError> {
        require_non_blank(topic, "topic, title, and body are required")?;
        let message_id = self
            .send_topic_record(NotificationKind::Topic, topic, content, None)
            .await?;

        info!(message_id = %message_id, "Notification sent to topic");
        Ok(TopicDelivery {
            topic: topic.to_string(),
            message_id,
        })
    }

    #[instrument(skip_all, fields(blood_type = %request.blood_type))]
    pub async fn send_blood_request(
        &self,
        request: &BloodRequest,
    ) -> Result<TopicDelivery, NotificationError> {
        let content = request.render(OffsetDateTime::now_utc())?;
        let topic = request.topic();
        let message_id = self
            .send_topic_record(
                NotificationKind::BloodRequest,
                &topic,
                content,
                Some(request),
            )
            .await?;

        info!(topic = %topic, message_id = %message_id, "Blood request broadcast");
        Ok(TopicDelivery { topic, message_id })
    }

    async fn send_topic_record(
        &self,
        kind: NotificationKind,
        topic: &str,
        content: MessageContent,
        blood_request: Option<&BloodRequest>,
    ) -> Result<String, NotificationError> {
        let message = PushMessage::to_topic(topic, content);
        let message_id = self.gateway.send(&message).await?;

        let mut record = NotificationRecord::delivered(
            kind,
            NotificationTarget::Topic {
                topic: topic.to_string(),
            },
            &message.content,
            message_id.clone(),
        );
        if let Some(request) = blood_request {
            record = record.with_blood_request(request.details());
        }
        self.audit.append(record).await?;
        Ok(message_id)
    }
}

pub(crate) fn require_non_blank(value: &str, message: &str) -> Result<(), NotificationError> {
    if value.trim().is_empty() {
        return Err(NotificationError::validation(message));
    }
    Ok(())
}
