//! Table definitions, created idempotently on startup.

use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::Result;

const USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    fcm_token TEXT,
    email TEXT,
    last_token_update TIMESTAMPTZ,
    updated_at TIMESTAMPTZ
)
"#;

const NOTIFICATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS notifications (
    seq BIGSERIAL,
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    user_id TEXT,
    fcm_token TEXT,
    batch_id TEXT,
    topic TEXT,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    data JSONB NOT NULL DEFAULT '{}',
    status TEXT NOT NULL,
    message_id TEXT,
    error TEXT,
    blood_request JSONB,
    sent_at TIMESTAMPTZ DEFAULT NOW()
)
"#;

const TOPIC_SUBSCRIPTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS topic_subscriptions (
    seq BIGSERIAL,
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    topic TEXT NOT NULL,
    fcm_token TEXT NOT NULL,
    status TEXT NOT NULL,
    subscribed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    unsubscribed_at TIMESTAMPTZ
)
"#;

const INDEXES: [&str; 3] = [
    "CREATE INDEX IF NOT EXISTS idx_notifications_user_sent \
     ON notifications(user_id, sent_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_batch \
     ON notifications(batch_id) WHERE batch_id IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_topic_subscriptions_user_topic \
     ON topic_subscriptions(user_id, topic, status)",
];

/// Create every table and index used by the store
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in [USERS, NOTIFICATIONS, TOPIC_SUBSCRIPTIONS].into_iter().chain(INDEXES) {
        sqlx_core::query::query(statement).execute(pool).await?;
    }
    info!("Donorcast schema ready");
    Ok(())
}
