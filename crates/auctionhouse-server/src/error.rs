//! The error type returned by every domain operation.
//!
//! Store, auth, auction-engine, scheduler and command-handler code all
//! converge on [`DomainError`] so that a single place decides how a failure
//! is rendered to a client, independent of whether it crossed an HTTP
//! handler, a WebSocket command or an internal scheduler tick.

use auctionhouse_eyre::eyre;
use axum::{
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
    Json,
};
use serde::Serialize;

/// The coarse class a [`DomainError`] belongs to, used both for HTTP status
/// mapping and for the `kind` field sent back to WebSocket clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    BadRequest,
    TooManyRequests,
    Timeout,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A domain-level failure, carrying enough context to render a useful
/// message without leaking internals (the `message` on [`Self::Internal`]
/// is logged, never sent to the client).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("not allowed to {action}")]
    Forbidden { action: String },

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{reason}")]
    Conflict { reason: String },

    #[error("{reason}")]
    BadRequest { reason: String },

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("operation timed out")]
    Timeout,

    #[error(transparent)]
    Internal(#[from] eyre::Report),
}

impl DomainError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::TooManyRequests { .. } => ErrorKind::TooManyRequests,
            Self::Timeout => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }

    /// Whether this error wraps a transient store serialization conflict
    /// (`40001`/`40P01`) that is safe to retry internally, per the error
    /// handling design's store-retry policy.
    #[must_use]
    pub fn is_transient_store_error(&self) -> bool {
        match self {
            Self::Internal(report) => report
                .downcast_ref::<sqlx::Error>()
                .is_some_and(crate::store::is_transient),
            _ => false,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = match &self {
            // internal errors are logged by the caller and never echoed back
            Self::Internal(report) => {
                tracing::error!(error = %report, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (kind.status(), Json(ErrorBody { kind, message })).into_response()
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound { entity: "row" },
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::conflict("already exists")
            }
            other => Self::Internal(eyre::Report::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_kind() {
        assert_eq!(ErrorKind::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorKind::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorKind::TooManyRequests.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ErrorKind::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ErrorKind::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: DomainError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
