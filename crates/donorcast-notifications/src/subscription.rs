use std::sync::Arc;

use tracing::{info, instrument};

use crate::dispatcher::require_non_blank;
use crate::error::NotificationError;
use crate::gateway::PushGateway;
use crate::store::{SubscriptionStore, TokenStore};
use crate::types::TopicSubscription;

const REQUIRED: &str = "userId and topic are required";

/// Adds and removes a user's current token on named topics, keeping the
/// subscription history in the store.
pub struct TopicSubscriptionManager {
    tokens: Arc<dyn TokenStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PushGateway>,
}

impl TopicSubscriptionManager {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn PushGateway>,
    ) -> Self {
        Self {
            tokens,
            subscriptions,
            gateway,
        }
    }

    async fn resolve(&self, user_id: &str, topic: &str) -> Result<String, NotificationError> {
        require_non_blank(user_id, REQUIRED)?;
        require_non_blank(topic, REQUIRED)?;
        self.tokens.lookup_token(user_id).await?.require()
    }

    #[instrument(skip(self), fields(user_id = %user_id, topic = %topic))]
    pub async fn subscribe(
        &self,
        user_id: &str,
        topic: &str,
    ) -> Result<TopicSubscription, NotificationError> {
        let token = self.resolve(user_id, topic).await?;
        self.gateway
            .subscribe(std::slice::from_ref(&token), topic)
            .await?;

        let stored = self
            .subscriptions
            .append(TopicSubscription::subscribed(user_id, topic, token))
            .await?;
        info!(subscription_id = %stored.id, "User subscribed to topic");
        Ok(stored)
    }

    /// Returns the number of subscription records closed, which may be zero
    #[instrument(skip(self), fields(user_id = %user_id, topic = %topic))]
    pub async fn unsubscribe(&self, user_id: &str, topic: &str) -> Result<u64, NotificationError> {
        let token = self.resolve(user_id, topic).await?;
        self.gateway
            .unsubscribe(std::slice::from_ref(&token), topic)
            .await?;

        let closed = self.subscriptions.close_active(user_id, topic).await?;
        info!(closed, "User unsubscribed from topic");
        Ok(closed)
    }
}
