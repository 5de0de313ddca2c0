use std::cmp::Ordering;

use async_trait::async_trait;
use dashmap::DashMap;
use donorcast_notifications::{
    AuditLog, NotificationError, NotificationRecord, SubscriptionStatus, SubscriptionStore,
    TokenStore, TopicSubscription, UserRecord,
};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// In-memory store backing all three storage traits.
///
/// Users live in a `DashMap` keyed by user id. The audit log and the
/// subscription history are append-only vectors behind async locks, so
/// insertion order doubles as a tie-breaker for equal timestamps.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    users: DashMap<String, UserRecord>,
    notifications: RwLock<Vec<NotificationRecord>>,
    subscriptions: RwLock<Vec<TopicSubscription>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user record as-is, e.g. one without a token.
    pub fn put_user(&self, user: UserRecord) {
        self.users.insert(user.user_id.clone(), user);
    }

    /// Append an audit record without assigning `sent_at`.
    pub async fn import_record(&self, record: NotificationRecord) {
        self.notifications.write().await.push(record);
    }

    pub async fn notification_count(&self) -> usize {
        self.notifications.read().await.len()
    }

    /// All audit records in insertion order
    pub async fn notifications(&self) -> Vec<NotificationRecord> {
        self.notifications.read().await.clone()
    }
}

/// Newest first; records without a timestamp sort last.
fn newest_first(a: &Option<OffsetDateTime>, b: &Option<OffsetDateTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, NotificationError> {
        Ok(self.users.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn save_token(
        &self,
        user_id: &str,
        token: &str,
        email: Option<&str>,
    ) -> Result<UserRecord, NotificationError> {
        let now = OffsetDateTime::now_utc();
        let mut entry = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord::without_token(user_id));
        let user = entry.value_mut();
        user.push_token = Some(token.to_string());
        user.email = email.map(str::to_string);
        user.last_token_update = Some(now);
        user.updated_at = Some(now);
        Ok(user.clone())
    }
}

#[async_trait]
impl AuditLog for InMemoryStore {
    async fn append(
        &self,
        mut record: NotificationRecord,
    ) -> Result<NotificationRecord, NotificationError> {
        record.sent_at = Some(OffsetDateTime::now_utc());
        self.notifications.write().await.push(record.clone());
        Ok(record)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, NotificationError> {
        let guard = self.notifications.read().await;
        // Reverse insertion order first so the stable sort keeps later writes ahead on ties
        let mut matching: Vec<NotificationRecord> = guard
            .iter()
            .rev()
            .filter(|r| r.target.user_id() == Some(user_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| newest_first(&a.sent_at, &b.sent_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn append(
        &self,
        mut subscription: TopicSubscription,
    ) -> Result<TopicSubscription, NotificationError> {
        subscription.subscribed_at = Some(OffsetDateTime::now_utc());
        self.subscriptions.write().await.push(subscription.clone());
        Ok(subscription)
    }

    async fn close_active(&self, user_id: &str, topic: &str) -> Result<u64, NotificationError> {
        let now = OffsetDateTime::now_utc();
        let mut guard = self.subscriptions.write().await;
        let mut closed = 0;
        for sub in guard.iter_mut().filter(|s| {
            s.user_id == user_id && s.topic == topic && s.status == SubscriptionStatus::Subscribed
        }) {
            sub.status = SubscriptionStatus::Unsubscribed;
            sub.unsubscribed_at = Some(now);
            closed += 1;
        }
        Ok(closed)
    }

    async fn list(
        &self,
        user_id: &str,
        topic: &str,
    ) -> Result<Vec<TopicSubscription>, NotificationError> {
        let guard = self.subscriptions.read().await;
        Ok(guard
            .iter()
            .filter(|s| s.user_id == user_id && s.topic == topic)
            .cloned()
            .collect())
    }
}
