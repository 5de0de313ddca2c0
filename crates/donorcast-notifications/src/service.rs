use std::sync::Arc;

use tracing::{info, instrument};

use crate::dispatcher::{NotificationDispatcher, require_non_blank};
use crate::error::NotificationError;
use crate::gateway::PushGateway;
use crate::history::NotificationHistory;
use crate::store::{AuditLog, SubscriptionStore, TokenStore};
use crate::subscription::TopicSubscriptionManager;
use crate::types::UserRecord;

/// Collaborators shared by the notification components
#[derive(Clone)]
pub struct NotificationContext {
    pub tokens: Arc<dyn TokenStore>,
    pub audit: Arc<dyn AuditLog>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub gateway: Arc<dyn PushGateway>,
}

impl NotificationContext {
    /// Context backed by a single store implementing every storage trait
    pub fn from_store<S>(store: Arc<S>, gateway: Arc<dyn PushGateway>) -> Self
    where
        S: TokenStore + AuditLog + SubscriptionStore + 'static,
    {
        Self {
            tokens: store.clone(),
            audit: store.clone(),
            subscriptions: store,
            gateway,
        }
    }
}

/// Entry point used by the HTTP surface
pub struct NotificationService {
    tokens: Arc<dyn TokenStore>,
    dispatcher: NotificationDispatcher,
    subscriptions: TopicSubscriptionManager,
    history: NotificationHistory,
}

impl NotificationService {
    pub fn new(ctx: NotificationContext) -> Self {
        Self {
            dispatcher: NotificationDispatcher::new(
                ctx.tokens.clone(),
                ctx.audit.clone(),
                ctx.gateway.clone(),
            ),
            subscriptions: TopicSubscriptionManager::new(
                ctx.tokens.clone(),
                ctx.subscriptions,
                ctx.gateway,
            ),
            history: NotificationHistory::new(ctx.audit),
            tokens: ctx.tokens,
        }
    }

    pub fn with_history_limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.history = self.history.with_limits(default_limit, max_limit);
        self
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn subscriptions(&self) -> &TopicSubscriptionManager {
        &self.subscriptions
    }

    pub fn history(&self) -> &NotificationHistory {
        &self.history
    }

    /// Register or replace a user's push token
    #[instrument(skip(self, token, email), fields(user_id = %user_id))]
    pub async fn save_token(
        &self,
        user_id: &str,
        token: &str,
        email: Option<&str>,
    ) -> Result<UserRecord, NotificationError> {
        require_non_blank(user_id, "userId and fcmToken are required")?;
        require_non_blank(token, "userId and fcmToken are required")?;
        let email = email.filter(|e| !e.trim().is_empty());

        let record = self.tokens.save_token(user_id, token, email).await?;
        info!("Push token saved");
        Ok(record)
    }
}
