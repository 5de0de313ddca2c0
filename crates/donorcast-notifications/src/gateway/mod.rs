pub mod auth;
pub mod dry_run;
pub mod fcm;

use async_trait::async_trait;

use crate::error::NotificationError;
use crate::types::MessageContent;

/// Where the push provider should deliver a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTarget {
    Token(String),
    Topic(String),
}

/// A message ready to be handed to the push provider
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub target: MessageTarget,
    pub content: MessageContent,
}

impl PushMessage {
    pub fn to_token(token: impl Into<String>, content: MessageContent) -> Self {
        Self {
            target: MessageTarget::Token(token.into()),
            content,
        }
    }

    pub fn to_topic(topic: impl Into<String>, content: MessageContent) -> Self {
        Self {
            target: MessageTarget::Topic(topic.into()),
            content,
        }
    }
}

/// Result of delivering to one token of a multicast send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { message_id: String },
    Failed { error: String },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// The external push provider.
///
/// Implementations must return multicast outcomes in the same order as the
/// submitted tokens; callers attribute outcomes to users by position.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Send one message, returning the provider's message id
    async fn send(&self, message: &PushMessage) -> Result<String, NotificationError>;

    /// Send the same content to several tokens, one outcome per token
    async fn send_multicast(
        &self,
        tokens: &[String],
        content: &MessageContent,
    ) -> Result<Vec<DeliveryOutcome>, NotificationError>;

    /// Add tokens to a topic
    async fn subscribe(&self, tokens: &[String], topic: &str) -> Result<(), NotificationError>;

    /// Remove tokens from a topic
    async fn unsubscribe(&self, tokens: &[String], topic: &str) -> Result<(), NotificationError>;
}

pub use auth::{AccessTokenSource, ServiceAccountKey, ServiceAccountTokenSource, StaticTokenSource};
pub use dry_run::DryRunGateway;
pub use fcm::{FcmConfig, FcmGateway};
