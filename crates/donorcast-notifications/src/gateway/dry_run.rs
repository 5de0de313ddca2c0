use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{DeliveryOutcome, MessageTarget, PushGateway, PushMessage};
use crate::error::NotificationError;
use crate::types::MessageContent;

/// Gateway that accepts every message without contacting a provider.
/// Used for local development.
#[derive(Debug, Default, Clone)]
pub struct DryRunGateway;

impl DryRunGateway {
    pub fn new() -> Self {
        Self
    }

    fn message_id() -> String {
        format!("dry-run/{}", Uuid::new_v4())
    }
}

#[async_trait]
impl PushGateway for DryRunGateway {
    async fn send(&self, message: &PushMessage) -> Result<String, NotificationError> {
        let message_id = Self::message_id();
        match &message.target {
            MessageTarget::Token(_) => {
                info!(
                    message_id = %message_id,
                    title = %message.content.title,
                    "Dry-run send to token"
                )
            }
            MessageTarget::Topic(topic) => {
                info!(
                    message_id = %message_id,
                    topic = %topic,
                    title = %message.content.title,
                    "Dry-run send to topic"
                )
            }
        }
        Ok(message_id)
    }

    async fn send_multicast(
        &self,
        tokens: &[String],
        content: &MessageContent,
    ) -> Result<Vec<DeliveryOutcome>, NotificationError> {
        info!(tokens = tokens.len(), title = %content.title, "Dry-run multicast");
        Ok(tokens
            .iter()
            .map(|_| DeliveryOutcome::Delivered {
                message_id: Self::message_id(),
            })
            .collect())
    }

    async fn subscribe(&self, tokens: &[String], topic: &str) -> Result<(), NotificationError> {
        info!(tokens = tokens.len(), topic, "Dry-run subscribe");
        Ok(())
    }

    async fn unsubscribe(&self, tokens: &[String], topic: &str) -> Result<(), NotificationError> {
        info!(tokens = tokens.len(), topic, "Dry-run unsubscribe");
        Ok(())
    }
}
