use std::sync::Arc;

use tracing::debug;

use crate::dispatcher::require_non_blank;
use crate::error::NotificationError;
use crate::store::AuditLog;
use crate::types::NotificationRecord;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Read side of the audit log
pub struct NotificationHistory {
    audit: Arc<dyn AuditLog>,
    default_limit: usize,
    max_limit: usize,
}

impl NotificationHistory {
    pub fn new(audit: Arc<dyn AuditLog>) -> Self {
        Self {
            audit,
            default_limit: DEFAULT_HISTORY_LIMIT,
            max_limit: MAX_HISTORY_LIMIT,
        }
    }

    pub fn with_limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.default_limit = default_limit;
        self.max_limit = max_limit;
        self
    }

    fn effective_limit(&self, limit: Option<usize>) -> Result<usize, NotificationError> {
        match limit {
            None => Ok(self.default_limit.min(self.max_limit)),
            Some(0) => Err(NotificationError::validation("limit must be at least 1")),
            Some(n) => Ok(n.min(self.max_limit)),
        }
    }

    /// A user's audit records, newest first
    pub async fn for_user(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<NotificationRecord>, NotificationError> {
        require_non_blank(user_id, "userId is required")?;
        let limit = self.effective_limit(limit)?;
        let records = self.audit.list_for_user(user_id, limit).await?;
        debug!(user_id, limit, count = records.len(), "Loaded notification history");
        Ok(records)
    }
}
