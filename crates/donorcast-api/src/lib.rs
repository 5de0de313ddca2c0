use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use donorcast_notifications::NotificationError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body returned for 5xx responses unless upstream detail is exposed
pub const UPSTREAM_ERROR_MESSAGE: &str = "Upstream service error";

/// Wire shape of every error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    /// A collaborator (push provider or database) failed
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map a domain error, hiding collaborator detail unless `expose_upstream` is set.
    pub fn from_notification(err: NotificationError, expose_upstream: bool) -> Self {
        match Self::from(err) {
            Self::Upstream(_) if !expose_upstream => Self::upstream(UPSTREAM_ERROR_MESSAGE),
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::Validation(msg) => ApiError::BadRequest(msg),
            NotificationError::UserNotFound
            | NotificationError::TokenUnavailable
            | NotificationError::NoValidTargets => ApiError::NotFound(err.to_string()),
            NotificationError::Gateway(_) | NotificationError::Storage(_) => {
                ApiError::Upstream(err.to_string())
            }
            NotificationError::InvalidConfig(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_body())).into_response()
    }
}

/// JSON body extractor whose rejections are 400 responses with an `error` field.
///
/// Covers malformed JSON, missing content type, non-object bodies and
/// fields of the wrong type.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request(format!("Invalid JSON body: {}", rejection.body_text()))
}

/// Query string extractor whose rejections are 400 responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParams<T>(pub T);

impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::bad_request(format!("Invalid query string: {}", rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{self, header};

    async fn body_of(resp: Response) -> ErrorBody {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn into_response_sets_status_and_error_field() {
        let resp = ApiError::not_found("User not found").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_of(resp).await.error, "User not found");
    }

    #[test]
    fn notification_errors_map_to_status() {
        let cases: Vec<(NotificationError, StatusCode, &str)> = vec![
            (
                NotificationError::validation("userId is required"),
                StatusCode::BAD_REQUEST,
                "userId is required",
            ),
            (
                NotificationError::UserNotFound,
                StatusCode::NOT_FOUND,
                "User not found",
            ),
            (
                NotificationError::TokenUnavailable,
                StatusCode::NOT_FOUND,
                "FCM token not found for user",
            ),
            (
                NotificationError::NoValidTargets,
                StatusCode::NOT_FOUND,
                "No valid FCM tokens found",
            ),
            (
                NotificationError::gateway("UNAVAILABLE"),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Push gateway error: UNAVAILABLE",
            ),
        ];
        for (err, status, message) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status_code(), status);
            assert_eq!(api.to_body().error, message);
        }
    }

    #[test]
    fn upstream_detail_hidden_unless_exposed() {
        let hidden =
            ApiError::from_notification(NotificationError::storage("pool timed out"), false);
        assert_eq!(hidden.to_string(), UPSTREAM_ERROR_MESSAGE);

        let shown = ApiError::from_notification(NotificationError::storage("pool timed out"), true);
        assert_eq!(shown.to_string(), "Storage error: pool timed out");

        let not_found = ApiError::from_notification(NotificationError::UserNotFound, false);
        assert_eq!(not_found.to_string(), "User not found");
    }

    #[derive(Debug, Deserialize)]
    struct Payload {
        #[allow(dead_code)]
        name: Option<String>,
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let req = http::Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let err = JsonBody::<Payload>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().starts_with("Invalid JSON body"));
    }

    #[tokio::test]
    async fn wrong_field_type_is_bad_request() {
        let req = http::Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name": 42}"#))
            .unwrap();
        let err = JsonBody::<Payload>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bad_query_is_bad_request() {
        #[derive(Debug, Deserialize)]
        struct Limit {
            #[allow(dead_code)]
            limit: Option<usize>,
        }
        let req = http::Request::builder()
            .uri("/x?limit=abc")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        let err = QueryParams::<Limit>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
