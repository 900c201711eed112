use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use donation_engine::{helpers::ConfigurationError, MatchingError, WebhookError};
use log::error;
use thiserror::Error;

pub const INVALID_MIN_DATE: &str = "Invalid minDate format. Use ISO 8601 format (e.g., 2025-01-01T00:00:00Z)";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("{0}")]
    InvalidQuery(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(#[from] ConfigurationError),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("{0}")]
    WebhookRejected(String),
    #[error("Internal Server Error")]
    WebhookFailed,
    #[error("Forbidden. {0}")]
    Forbidden(String),
    #[error("Unauthorized. {0}")]
    Unauthorized(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::WebhookRejected(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::WebhookFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

/// Rejections of the request itself become a 400 with the reason. Anything that went wrong while handling a
/// legitimate webhook is logged and reported as an opaque 500, so that the provider retries it.
impl From<WebhookError> for ServerError {
    fn from(e: WebhookError) -> Self {
        if e.is_rejection() {
            Self::WebhookRejected(e.to_string())
        } else {
            error!("💻️ Webhook processing failed. {e}");
            Self::WebhookFailed
        }
    }
}

impl From<MatchingError> for ServerError {
    fn from(e: MatchingError) -> Self {
        Self::BackendError(e.to_string())
    }
}
