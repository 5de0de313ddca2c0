//! PostgreSQL implementation of the Donorcast storage traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use donorcast_notifications::{
    AuditLog, BloodRequestDetails, DeliveryStatus, MessageData, NotificationError,
    NotificationKind, NotificationRecord, NotificationTarget, SubscriptionStatus,
    SubscriptionStore, TokenStore, TopicSubscription, UserRecord,
};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};
use crate::pool::create_pool;
use crate::schema::ensure_schema;

type UserRow = (
    String,
    Option<String>,
    Option<String>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

type NotificationRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
    Value,
    String,
    Option<String>,
    Option<String>,
    Option<Value>,
    Option<DateTime<Utc>>,
);

type SubscriptionRow = (
    String,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

const USER_COLUMNS: &str = "user_id, fcm_token, email, last_token_update, updated_at";

const NOTIFICATION_COLUMNS: &str = "id, type, user_id, fcm_token, batch_id, topic, title, body, \
     data, status, message_id, error, blood_request, sent_at";

const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, topic, fcm_token, status, subscribed_at, unsubscribed_at";

/// PostgreSQL store backing all three storage traits.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `config`, creating the schema when configured to.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        if config.create_schema {
            ensure_schema(&pool).await?;
        }
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or replace a user record as-is, e.g. one without a token.
    pub async fn put_user(&self, user: &UserRecord) -> Result<()> {
        query(
            r#"
            INSERT INTO users (user_id, fcm_token, email, last_token_update, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                fcm_token = EXCLUDED.fcm_token,
                email = EXCLUDED.email,
                last_token_update = EXCLUDED.last_token_update,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.push_token)
        .bind(&user.email)
        .bind(time_to_chrono_opt(user.last_token_update)?)
        .bind(time_to_chrono_opt(user.updated_at)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<Option<DateTime<Utc>>> {
        let (user_id, fcm_token, batch_id, topic) = match &record.target {
            NotificationTarget::User {
                user_id,
                fcm_token,
                batch_id,
            } => (Some(user_id), Some(fcm_token), batch_id.as_ref(), None),
            NotificationTarget::Topic { topic } => (None, None, None, Some(topic)),
        };
        let data = serde_json::to_value(&record.data)?;
        let blood_request = record
            .blood_request
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let sent_at: Option<DateTime<Utc>> = query_scalar(
            r#"
            INSERT INTO notifications (
                id, type, user_id, fcm_token, batch_id, topic, title, body,
                data, status, message_id, error, blood_request
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING sent_at
            "#,
        )
        .bind(&record.id)
        .bind(record.kind.as_str())
        .bind(user_id)
        .bind(fcm_token)
        .bind(batch_id)
        .bind(topic)
        .bind(&record.title)
        .bind(&record.body)
        .bind(data)
        .bind(record.status.as_str())
        .bind(&record.message_id)
        .bind(&record.error)
        .bind(blood_request)
        .fetch_one(&self.pool)
        .await?;
        Ok(sent_at)
    }
}

fn time_to_chrono(t: OffsetDateTime) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond())
        .ok_or_else(|| PostgresError::corrupt(format!("timestamp {t} out of range")))
}

fn time_to_chrono_opt(t: Option<OffsetDateTime>) -> Result<Option<DateTime<Utc>>> {
    t.map(time_to_chrono).transpose()
}

fn chrono_to_time(t: DateTime<Utc>) -> Result<OffsetDateTime> {
    let nanos = i128::from(t.timestamp()) * 1_000_000_000 + i128::from(t.timestamp_subsec_nanos());
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|e| PostgresError::corrupt(format!("timestamp {t}: {e}")))
}

fn chrono_to_time_opt(t: Option<DateTime<Utc>>) -> Result<Option<OffsetDateTime>> {
    t.map(chrono_to_time).transpose()
}

fn user_from_row(row: UserRow) -> Result<UserRecord> {
    let (user_id, push_token, email, last_token_update, updated_at) = row;
    Ok(UserRecord {
        user_id,
        push_token,
        email,
        last_token_update: chrono_to_time_opt(last_token_update)?,
        updated_at: chrono_to_time_opt(updated_at)?,
    })
}

fn notification_from_row(row: NotificationRow) -> Result<NotificationRecord> {
    let (
        id,
        kind,
        user_id,
        fcm_token,
        batch_id,
        topic,
        title,
        body,
        data,
        status,
        message_id,
        error,
        blood_request,
        sent_at,
    ) = row;

    let kind = NotificationKind::parse(&kind)
        .ok_or_else(|| PostgresError::corrupt(format!("notification {id}: type '{kind}'")))?;
    let status = DeliveryStatus::parse(&status)
        .ok_or_else(|| PostgresError::corrupt(format!("notification {id}: status '{status}'")))?;
    let target = match (user_id, fcm_token, topic) {
        (Some(user_id), Some(fcm_token), _) => NotificationTarget::User {
            user_id,
            fcm_token,
            batch_id,
        },
        (_, _, Some(topic)) => NotificationTarget::Topic { topic },
        _ => return Err(PostgresError::corrupt(format!("notification {id}: no target"))),
    };
    let data: MessageData = serde_json::from_value(data)?;
    let blood_request: Option<BloodRequestDetails> =
        blood_request.map(serde_json::from_value).transpose()?;

    Ok(NotificationRecord {
        id,
        kind,
        target,
        title,
        body,
        data,
        status,
        message_id,
        error,
        blood_request,
        sent_at: chrono_to_time_opt(sent_at)?,
    })
}

fn subscription_from_row(row: SubscriptionRow) -> Result<TopicSubscription> {
    let (id, user_id, topic, fcm_token, status, subscribed_at, unsubscribed_at) = row;
    let status = SubscriptionStatus::parse(&status)
        .ok_or_else(|| PostgresError::corrupt(format!("subscription {id}: status '{status}'")))?;
    Ok(TopicSubscription {
        id,
        user_id,
        topic,
        fcm_token,
        status,
        subscribed_at: Some(chrono_to_time(subscribed_at)?),
        unsubscribed_at: chrono_to_time_opt(unsubscribed_at)?,
    })
}

#[async_trait]
impl TokenStore for PostgresStore {
    #[instrument(skip(self))]
    async fn get_user(
        &self,
        user_id: &str,
    ) -> std::result::Result<Option<UserRecord>, NotificationError> {
        let row: Option<UserRow> =
            query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(PostgresError::from)?;
        Ok(row.map(user_from_row).transpose()?)
    }

    #[instrument(skip(self, token, email))]
    async fn save_token(
        &self,
        user_id: &str,
        token: &str,
        email: Option<&str>,
    ) -> std::result::Result<UserRecord, NotificationError> {
        let row: UserRow = query_as(&format!(
            r#"
            INSERT INTO users (user_id, fcm_token, email, last_token_update, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                fcm_token = EXCLUDED.fcm_token,
                email = EXCLUDED.email,
                last_token_update = EXCLUDED.last_token_update,
                updated_at = EXCLUDED.updated_at
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(token)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(PostgresError::from)?;

        debug!("Saved push token");
        Ok(user_from_row(row)?)
    }
}

#[async_trait]
impl AuditLog for PostgresStore {
    #[instrument(skip_all, fields(id = %record.id, kind = record.kind.as_str()))]
    async fn append(
        &self,
        mut record: NotificationRecord,
    ) -> std::result::Result<NotificationRecord, NotificationError> {
        let sent_at = self.insert_notification(&record).await?;
        record.sent_at = chrono_to_time_opt(sent_at)?;
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<NotificationRecord>, NotificationError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<NotificationRow> = query_as(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1 ORDER BY sent_at DESC NULLS LAST, seq DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(PostgresError::from)?;

        let records = rows
            .into_iter()
            .map(notification_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[async_trait]
impl SubscriptionStore for PostgresStore {
    #[instrument(skip_all, fields(user_id = %subscription.user_id, topic = %subscription.topic))]
    async fn append(
        &self,
        mut subscription: TopicSubscription,
    ) -> std::result::Result<TopicSubscription, NotificationError> {
        let subscribed_at: DateTime<Utc> = query_scalar(
            r#"
            INSERT INTO topic_subscriptions (id, user_id, topic, fcm_token, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING subscribed_at
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.user_id)
        .bind(&subscription.topic)
        .bind(&subscription.fcm_token)
        .bind(subscription.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(PostgresError::from)?;

        subscription.subscribed_at = Some(chrono_to_time(subscribed_at)?);
        Ok(subscription)
    }

    #[instrument(skip(self))]
    async fn close_active(
        &self,
        user_id: &str,
        topic: &str,
    ) -> std::result::Result<u64, NotificationError> {
        let result = query(
            r#"
            UPDATE topic_subscriptions
            SET status = $3, unsubscribed_at = NOW()
            WHERE user_id = $1 AND topic = $2 AND status = $4
            "#,
        )
        .bind(user_id)
        .bind(topic)
        .bind(SubscriptionStatus::Unsubscribed.as_str())
        .bind(SubscriptionStatus::Subscribed.as_str())
        .execute(&self.pool)
        .await
        .map_err(PostgresError::from)?;

        Ok(result.rows_affected())
    }

    async fn list(
        &self,
        user_id: &str,
        topic: &str,
    ) -> std::result::Result<Vec<TopicSubscription>, NotificationError> {
        let rows: Vec<SubscriptionRow> = query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM topic_subscriptions \
             WHERE user_id = $1 AND topic = $2 ORDER BY seq"
        ))
        .bind(user_id)
        .bind(topic)
        .fetch_all(&self.pool)
        .await
        .map_err(PostgresError::from)?;

        let subscriptions = rows
            .into_iter()
            .map(subscription_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(subscriptions)
    }
}
