use std::num::IntErrorKind;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use donorcast_api::{ApiError, JsonBody, QueryParams};
use donorcast_notifications::{BloodRequest, MessageContent, MessageData};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::server::AppState;

type HandlerResult = Result<Json<Value>, ApiError>;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

pub async fn health() -> impl IntoResponse {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            timestamp,
        }),
    )
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

/// Non-blank value of an optional request field
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn content(title: &str, body: &str, data: Option<MessageData>) -> Result<MessageContent, ApiError> {
    MessageContent::new(title, body, data.unwrap_or_default()).map_err(ApiError::from)
}

// ---- Tokens ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTokenRequest {
    user_id: Option<String>,
    fcm_token: Option<String>,
    user_email: Option<String>,
}

pub async fn save_fcm_token(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SaveTokenRequest>,
) -> HandlerResult {
    let (Some(user_id), Some(token)) = (present(&req.user_id), present(&req.fcm_token)) else {
        return Err(ApiError::bad_request("userId and fcmToken are required"));
    };
    state
        .service
        .save_token(user_id, token, req.user_email.as_deref())
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "message": "FCM token saved successfully",
        "userId": user_id,
    })))
}

// ---- Sends ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    user_id: Option<String>,
    title: Option<String>,
    body: Option<String>,
    data: Option<MessageData>,
}

pub async fn send_notification(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SendNotificationRequest>,
) -> HandlerResult {
    let (Some(user_id), Some(title), Some(body)) =
        (present(&req.user_id), present(&req.title), present(&req.body))
    else {
        return Err(ApiError::bad_request("userId, title, and body are required"));
    };
    let delivery = state
        .service
        .dispatcher()
        .send_to_user(user_id, content(title, body, req.data)?)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "message": "Notification sent successfully",
        "messageId": delivery.message_id,
        "userId": delivery.user_id,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticastRequest {
    user_ids: Option<Vec<String>>,
    title: Option<String>,
    body: Option<String>,
    data: Option<MessageData>,
}

pub async fn send_notification_to_multiple(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<MulticastRequest>,
) -> HandlerResult {
    let user_ids = req.user_ids.unwrap_or_default();
    let (Some(title), Some(body)) = (present(&req.title), present(&req.body)) else {
        return Err(ApiError::bad_request("userIds, title, and body are required"));
    };
    if user_ids.is_empty() {
        return Err(ApiError::bad_request("userIds, title, and body are required"));
    }
    let delivery = state
        .service
        .dispatcher()
        .send_to_users(&user_ids, content(title, body, req.data)?)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "message": "Multicast notification sent",
        "batchId": delivery.batch_id,
        "successCount": delivery.success_count,
        "failureCount": delivery.failure_count,
        "totalCount": delivery.total_count,
    })))
}

#[derive(Debug, Deserialize)]
pub struct TopicRequest {
    topic: Option<String>,
    title: Option<String>,
    body: Option<String>,
    data: Option<MessageData>,
}

pub async fn send_notification_by_topic(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TopicRequest>,
) -> HandlerResult {
    let (Some(topic), Some(title), Some(body)) =
        (present(&req.topic), present(&req.title), present(&req.body))
    else {
        return Err(ApiError::bad_request("topic, title, and body are required"));
    };
    let delivery = state
        .service
        .dispatcher()
        .send_to_topic(topic, content(title, body, req.data)?)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "message": "Topic notification sent successfully",
        "messageId": delivery.message_id,
        "topic": delivery.topic,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodRequestBody {
    blood_type: Option<String>,
    location: Option<String>,
    urgency: Option<String>,
    requester_name: Option<String>,
    hospital_name: Option<String>,
}

pub async fn blood_request_notification(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<BloodRequestBody>,
) -> HandlerResult {
    let request = BloodRequest {
        blood_type: req.blood_type.unwrap_or_default(),
        location: req.location.unwrap_or_default(),
        urgency: req.urgency,
        requester_name: req.requester_name,
        hospital_name: req.hospital_name,
    };
    request.validate()?;
    let delivery = state
        .service
        .dispatcher()
        .send_blood_request(&request)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "message": "Blood request notification sent successfully",
        "messageId": delivery.message_id,
        "topic": delivery.topic,
    })))
}

// ---- Topic subscriptions ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    user_id: Option<String>,
    topic: Option<String>,
}

impl SubscriptionRequest {
    fn fields(&self) -> Result<(&str, &str), ApiError> {
        match (present(&self.user_id), present(&self.topic)) {
            (Some(user_id), Some(topic)) => Ok((user_id, topic)),
            _ => Err(ApiError::bad_request("userId and topic are required")),
        }
    }
}

pub async fn subscribe_to_topic(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SubscriptionRequest>,
) -> HandlerResult {
    let (user_id, topic) = req.fields()?;
    state
        .service
        .subscriptions()
        .subscribe(user_id, topic)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully subscribed to topic {topic}"),
        "topic": topic,
        "userId": user_id,
    })))
}

pub async fn unsubscribe_from_topic(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SubscriptionRequest>,
) -> HandlerResult {
    let (user_id, topic) = req.fields()?;
    let closed = state
        .service
        .subscriptions()
        .unsubscribe(user_id, topic)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully unsubscribed from topic {topic}"),
        "topic": topic,
        "userId": user_id,
        "closedCount": closed,
    })))
}

// ---- History ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    user_id: Option<String>,
    /// Kept as text so a non-numeric value gets the same error shape as other 400s
    limit: Option<String>,
}

/// Values too large for `usize` saturate; the history cap applies to them as to any other.
fn parse_limit(raw: Option<&str>) -> Result<Option<usize>, ApiError> {
    let Some(v) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match v.parse::<usize>() {
        Ok(n) => Ok(Some(n)),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => Ok(Some(usize::MAX)),
        Err(_) => Err(ApiError::bad_request("limit must be a positive integer")),
    }
}

pub async fn get_user_notifications(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<HistoryQuery>,
) -> HandlerResult {
    let Some(user_id) = present(&query.user_id) else {
        return Err(ApiError::bad_request("userId is required"));
    };
    let limit = parse_limit(query.limit.as_deref())?;
    let notifications = state
        .service
        .history()
        .for_user(user_id, limit)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "count": notifications.len(),
        "notifications": notifications,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_parsing() {
        assert_eq!(parse_limit(None).unwrap(), None);
        assert_eq!(parse_limit(Some("")).unwrap(), None);
        assert_eq!(parse_limit(Some(" 20 ")).unwrap(), Some(20));
        assert_eq!(parse_limit(Some("0")).unwrap(), Some(0));
        assert!(parse_limit(Some("abc")).is_err());
        assert!(parse_limit(Some("-5")).is_err());
        assert_eq!(
            parse_limit(Some("100000000000000000000000")).unwrap(),
            Some(usize::MAX)
        );
    }

    #[test]
    fn blank_fields_are_not_present() {
        assert_eq!(present(&None), None);
        assert_eq!(present(&Some("  ".into())), None);
        assert_eq!(present(&Some("u1".into())), Some("u1"));
    }
}
