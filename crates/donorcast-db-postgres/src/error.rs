//! Error types for the PostgreSQL storage backend.

use donorcast_notifications::NotificationError;

#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::error::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PostgresError {
    #[must_use]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptRow(message.into())
    }
}

impl From<PostgresError> for NotificationError {
    fn from(err: PostgresError) -> Self {
        NotificationError::storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PostgresError>;
