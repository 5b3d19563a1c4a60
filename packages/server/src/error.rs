use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use sea_orm::DbErr;
use serde::Serialize;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `TOKEN_MISSING`,
    /// `TOKEN_INVALID`, `INVALID_CREDENTIALS`, `NOT_FOUND`, `PRECONDITION_FAILED`,
    /// `CONFLICT`, `USERNAME_TAKEN`, `THUMBNAIL_UNAVAILABLE`, `SIGNATURE_REJECTED`,
    /// `PAYLOAD_TOO_LARGE`, `PRESIGN_FAILED`, `STORE_UNAVAILABLE`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "file_size must be between 1 and 10485760 bytes")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    TokenMissing,
    TokenInvalid,
    InvalidCredentials,
    /// Missing, or owned by someone else. The two are indistinguishable.
    NotFound(String),
    /// The record is not in a state that allows the operation.
    PreconditionFailed(String),
    Conflict(String),
    UsernameTaken,
    ThumbnailUnavailable,
    /// A signed blob URL failed verification or has expired.
    SignatureRejected,
    PayloadTooLarge(u64),
    PresignFailed(String),
    /// Retryable storage or database failure. Detail is logged, never returned.
    StoreUnavailable(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_MISSING",
                    message: "Authentication required".into(),
                },
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_INVALID",
                    message: "Invalid or expired token".into(),
                },
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "INVALID_CREDENTIALS",
                    message: "Invalid username or password".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::PreconditionFailed(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "PRECONDITION_FAILED",
                    message: msg,
                },
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "CONFLICT",
                    message: msg,
                },
            ),
            AppError::UsernameTaken => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "USERNAME_TAKEN",
                    message: "Username is already taken".into(),
                },
            ),
            AppError::ThumbnailUnavailable => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    code: "THUMBNAIL_UNAVAILABLE",
                    message: "A thumbnail could not be generated from the uploaded image".into(),
                },
            ),
            AppError::SignatureRejected => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "SIGNATURE_REJECTED",
                    message: "Signed URL is invalid or has expired".into(),
                },
            ),
            AppError::PayloadTooLarge(limit) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody {
                    code: "PAYLOAD_TOO_LARGE",
                    message: format!("Body exceeds the limit of {limit} bytes"),
                },
            ),
            AppError::PresignFailed(detail) => {
                tracing::error!("Presign error: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorBody {
                        code: "PRESIGN_FAILED",
                        message: "Could not issue a signed storage URL".into(),
                    },
                )
            }
            AppError::StoreUnavailable(detail) => {
                tracing::error!("Store unavailable: {}", detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorBody {
                        code: "STORE_UNAVAILABLE",
                        message: "Storage is temporarily unavailable, please retry".into(),
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => {
                AppError::StoreUnavailable(err.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => {
                tracing::debug!(%key, "Object not found");
                AppError::NotFound("Object not found".into())
            }
            StorageError::InvalidKey(msg) => AppError::Validation(msg),
            StorageError::Presign(msg) => AppError::PresignFailed(msg),
            StorageError::SizeLimitExceeded { limit, .. } => AppError::PayloadTooLarge(limit),
            other => AppError::StoreUnavailable(other.to_string()),
        }
    }
}
