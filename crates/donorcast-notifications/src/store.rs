use async_trait::async_trait;

use crate::error::NotificationError;
use crate::types::{NotificationRecord, TokenLookup, TopicSubscription, UserRecord};

/// Storage trait for per-user push tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Get a user record by ID
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, NotificationError>;

    /// Create or merge a user record with a new token.
    /// Token, email and both timestamps are overwritten.
    async fn save_token(
        &self,
        user_id: &str,
        token: &str,
        email: Option<&str>,
    ) -> Result<UserRecord, NotificationError>;

    /// Resolve a user to a deliverable token
    async fn lookup_token(&self, user_id: &str) -> Result<TokenLookup, NotificationError> {
        Ok(TokenLookup::from_record(self.get_user(user_id).await?))
    }
}

/// Append-only log of delivery attempts
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append a record. The store assigns `sent_at` and returns the stored record.
    async fn append(&self, record: NotificationRecord)
    -> Result<NotificationRecord, NotificationError>;

    /// Append several records, preserving their order
    async fn append_all(
        &self,
        records: Vec<NotificationRecord>,
    ) -> Result<Vec<NotificationRecord>, NotificationError> {
        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            stored.push(self.append(record).await?);
        }
        Ok(stored)
    }

    /// Records addressed to a user, newest `sent_at` first, at most `limit`.
    /// Records without a timestamp sort last.
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, NotificationError>;
}

/// Storage trait for topic subscription history
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Append a subscription record. The store assigns `subscribed_at`.
    async fn append(
        &self,
        subscription: TopicSubscription,
    ) -> Result<TopicSubscription, NotificationError>;

    /// Mark every `subscribed` record for (user, topic) as unsubscribed.
    /// Returns the number of records closed.
    async fn close_active(&self, user_id: &str, topic: &str) -> Result<u64, NotificationError>;

    /// All records for (user, topic) in insertion order
    async fn list(
        &self,
        user_id: &str,
        topic: &str,
    ) -> Result<Vec<TopicSubscription>, NotificationError>;
}
