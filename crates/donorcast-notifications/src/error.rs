use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("{0}")]
    Validation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("FCM token not found for user")]
    TokenUnavailable,

    #[error("No valid FCM tokens found")]
    NoValidTargets,

    #[error("Push gateway error: {0}")]
    Gateway(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NotificationError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// True for failures raised by an external collaborator rather than by the request.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Gateway(_) | Self::Storage(_))
    }
}
