//! Mapping from core errors to HTTP responses.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;

use playgate_core::{Error, LimitKind};

/// Header carrying the calling agent's identity.
pub const AGENT_HEADER: &str = "x-agent-id";

/// One validation issue in a 422 body.
#[derive(Debug, Serialize)]
pub struct IssueBody {
    pub kind: &'static str,
    pub detail: String,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable machine code.
    pub code: &'static str,
    /// Caller-safe message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<IssueBody>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<LimitKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<String>,
}

/// Handler error wrapper.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Rejected(_) | Error::Asset(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        Error::BootstrapFault(_) | Error::RuntimeFault { .. } => StatusCode::BAD_GATEWAY,
        Error::InstanceNotFound(_) | Error::SessionNotFound(_) | Error::GameNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        Error::InstanceLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::TerminalStateViolation(_) => StatusCode::CONFLICT,
        Error::NotSessionOwner(_) | Error::NotInstanceOwner(_) => StatusCode::FORBIDDEN,
        Error::InvalidRequest(_) | Error::Serialization(_) => StatusCode::BAD_REQUEST,
        Error::Storage(_) | Error::Config(_) | Error::Internal(_) | Error::Other(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!(code = err.code(), error = %err, "Request failed");
        } else {
            tracing::debug!(code = err.code(), error = %err, "Request rejected");
        }

        let mut body = ErrorResponse {
            code: err.code(),
            message: err.public_message(),
            errors: None,
            limit: None,
            reset_at: None,
        };
        let mut retry_after = None;

        match &err {
            Error::Rejected(report) => {
                body.errors = Some(
                    report
                        .issues()
                        .iter()
                        .map(|issue| IssueBody {
                            kind: issue.kind(),
                            detail: issue.detail(),
                        })
                        .collect(),
                );
            }
            Error::RateLimited { limit, reset_at } => {
                body.limit = Some(*limit);
                body.reset_at = Some(reset_at.to_rfc3339());
                let secs = (*reset_at - Utc::now()).num_seconds().max(1);
                retry_after = HeaderValue::from_str(&secs.to_string()).ok();
            }
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(value) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Agent identity taken from the `x-agent-id` header.
#[derive(Debug, Clone)]
pub struct AgentId(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AgentId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AGENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| AgentId(v.to_string()))
            .ok_or_else(|| {
                ApiError(Error::invalid_request(format!(
                    "missing {} header",
                    AGENT_HEADER
                )))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playgate_core::{BridgeErrorKind, Operation};

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&Error::TerminalStateViolation("s".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::NotSessionOwner("s".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&Error::runtime_fault(
                Operation::ReadState,
                BridgeErrorKind::Timeout,
                "slow"
            )),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError(Error::RateLimited {
            limit: LimitKind::SessionsPerHour,
            reset_at: Utc::now() + chrono::Duration::seconds(120),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry: i64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry > 0 && retry <= 120);
    }
}
