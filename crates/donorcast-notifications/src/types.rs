use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::NotificationError;

/// Free-form key/value payload delivered to the client untouched.
pub type MessageData = BTreeMap<String, String>;

/// One record per user in the token store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,

    /// Token issued by the push provider for the user's device
    #[serde(rename = "fcmToken", default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(
        with = "time::serde::rfc3339::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_token_update: Option<OffsetDateTime>,

    #[serde(
        with = "time::serde::rfc3339::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl UserRecord {
    /// A record without a token, as written by other parts of the system.
    pub fn without_token(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            push_token: None,
            email: None,
            last_token_update: None,
            updated_at: None,
        }
    }

    /// The token if it can be used as a delivery target. Empty tokens count as missing.
    pub fn deliverable_token(&self) -> Option<&str> {
        self.push_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Outcome of resolving a user id to a push token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    /// No record exists for the user
    Missing,
    /// A record exists but carries no usable token
    NoToken,
    Token(String),
}

impl TokenLookup {
    pub fn from_record(record: Option<UserRecord>) -> Self {
        match record {
            None => Self::Missing,
            Some(user) => match user.deliverable_token() {
                Some(token) => Self::Token(token.to_string()),
                None => Self::NoToken,
            },
        }
    }

    /// Single-target resolution: both kinds of miss are errors, kept distinct.
    pub fn require(self) -> Result<String, NotificationError> {
        match self {
            Self::Token(token) => Ok(token),
            Self::Missing => Err(NotificationError::UserNotFound),
            Self::NoToken => Err(NotificationError::TokenUnavailable),
        }
    }

    pub fn into_token(self) -> Option<String> {
        match self {
            Self::Token(token) => Some(token),
            _ => None,
        }
    }
}

/// Title, body and data of an outbound push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: MessageData,
}

impl MessageContent {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        data: MessageData,
    ) -> Result<Self, NotificationError> {
        let title = title.into();
        let body = body.into();
        if title.trim().is_empty() || body.trim().is_empty() {
            return Err(NotificationError::validation("title and body are required"));
        }
        Ok(Self { title, body, data })
    }
}

/// Outcome status of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Which send path produced an audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Direct,
    Multicast,
    Topic,
    BloodRequest,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Multicast => "multicast",
            Self::Topic => "topic",
            Self::BloodRequest => "blood_request",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "multicast" => Some(Self::Multicast),
            "topic" => Some(Self::Topic),
            "blood_request" => Some(Self::BloodRequest),
            _ => None,
        }
    }
}

/// Addressee of an audited delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationTarget {
    User {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "fcmToken")]
        fcm_token: String,
        /// Shared by every record written for one multicast request
        #[serde(rename = "batchId", default, skip_serializing_if = "Option::is_none")]
        batch_id: Option<String>,
    },
    Topic {
        topic: String,
    },
}

impl NotificationTarget {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User { user_id, .. } => Some(user_id),
            Self::Topic { .. } => None,
        }
    }

    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::Topic { topic } => Some(topic),
            Self::User { .. } => None,
        }
    }
}

/// Details recorded alongside a blood request broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodRequestDetails {
    pub blood_type: String,
    pub location: String,
    pub urgency: String,
    pub requester_name: String,
    pub hospital_name: String,
}

/// Append-only audit entry describing one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: NotificationKind,

    #[serde(flatten)]
    pub target: NotificationTarget,

    pub title: String,
    pub body: String,

    #[serde(default)]
    pub data: MessageData,

    pub status: DeliveryStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_request: Option<BloodRequestDetails>,

    /// Assigned by the store at write time
    #[serde(
        with = "time::serde::rfc3339::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sent_at: Option<OffsetDateTime>,
}

impl NotificationRecord {
    fn new(
        kind: NotificationKind,
        target: NotificationTarget,
        content: &MessageContent,
        status: DeliveryStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            target,
            title: content.title.clone(),
            body: content.body.clone(),
            data: content.data.clone(),
            status,
            message_id: None,
            error: None,
            blood_request: None,
            sent_at: None,
        }
    }

    pub fn delivered(
        kind: NotificationKind,
        target: NotificationTarget,
        content: &MessageContent,
        message_id: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(kind, target, content, DeliveryStatus::Sent);
        record.message_id = Some(message_id.into());
        record
    }

    pub fn failed(
        kind: NotificationKind,
        target: NotificationTarget,
        content: &MessageContent,
        error: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(kind, target, content, DeliveryStatus::Failed);
        record.error = Some(error.into());
        record
    }

    pub fn with_blood_request(mut self, details: BloodRequestDetails) -> Self {
        self.blood_request = Some(details);
        self
    }
}

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Subscribed,
    Unsubscribed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::Unsubscribed => "unsubscribed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subscribed" => Some(Self::Subscribed),
            "unsubscribed" => Some(Self::Unsubscribed),
            _ => None,
        }
    }
}

/// A user's token subscribed to a named topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSubscription {
    pub id: String,
    pub user_id: String,
    pub topic: String,
    pub fcm_token: String,
    pub status: SubscriptionStatus,

    #[serde(
        with = "time::serde::rfc3339::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub subscribed_at: Option<OffsetDateTime>,

    #[serde(
        with = "time::serde::rfc3339::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub unsubscribed_at: Option<OffsetDateTime>,
}

impl TopicSubscription {
    pub fn subscribed(
        user_id: impl Into<String>,
        topic: impl Into<String>,
        fcm_token: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            topic: topic.into(),
            fcm_token: fcm_token.into(),
            status: SubscriptionStatus::Subscribed,
            subscribed_at: None,
            unsubscribed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content() -> MessageContent {
        MessageContent::new("Hi", "Hello", MessageData::new()).unwrap()
    }

    #[test]
    fn test_token_lookup_distinguishes_misses() {
        assert_eq!(TokenLookup::from_record(None), TokenLookup::Missing);

        let tokenless = UserRecord::without_token("u1");
        assert_eq!(TokenLookup::from_record(Some(tokenless)), TokenLookup::NoToken);

        let mut empty = UserRecord::without_token("u1");
        empty.push_token = Some(String::new());
        assert_eq!(TokenLookup::from_record(Some(empty)), TokenLookup::NoToken);

        assert!(matches!(
            TokenLookup::Missing.require(),
            Err(NotificationError::UserNotFound)
        ));
        assert!(matches!(
            TokenLookup::NoToken.require(),
            Err(NotificationError::TokenUnavailable)
        ));
    }

    #[test]
    fn test_message_content_rejects_blank_fields() {
        assert!(MessageContent::new("  ", "body", MessageData::new()).is_err());
        assert!(MessageContent::new("title", "", MessageData::new()).is_err());
    }

    #[test]
    fn test_direct_record_wire_shape() {
        let record = NotificationRecord::delivered(
            NotificationKind::Direct,
            NotificationTarget::User {
                user_id: "u1".into(),
                fcm_token: "tok".into(),
                batch_id: None,
            },
            &content(),
            "projects/p/messages/1",
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "direct");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["fcmToken"], "tok");
        assert_eq!(value["status"], "sent");
        assert_eq!(value["messageId"], "projects/p/messages/1");
        assert!(value.get("error").is_none());
        assert!(value.get("sentAt").is_none());
        assert!(value.get("batchId").is_none());
    }

    #[test]
    fn test_topic_record_parses_back() {
        let raw = json!({
            "id": "n1",
            "type": "topic",
            "topic": "news",
            "title": "T",
            "body": "B",
            "status": "failed",
            "error": "quota exceeded",
            "sentAt": "2024-05-01T10:00:00Z"
        });
        let record: NotificationRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.target.topic(), Some("news"));
        assert_eq!(record.status, DeliveryStatus::Failed);
        assert!(record.data.is_empty());
        assert!(record.sent_at.is_some());
    }

    #[test]
    fn test_status_strings() {
        for status in [DeliveryStatus::Sent, DeliveryStatus::Failed] {
            assert_eq!(DeliveryStatus::parse(status.as_str()), Some(status));
        }
        for kind in [
            NotificationKind::Direct,
            NotificationKind::Multicast,
            NotificationKind::Topic,
            NotificationKind::BloodRequest,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SubscriptionStatus::parse("gone"), None);
    }
}
