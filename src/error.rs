//! Common error types for the sketch generation gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineVariant;

/// Caller-fixable problems with a generation request.
///
/// Always detected before any engine resource is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        min: String,
        max: String,
        value: String,
    },

    #[error("{field} is not a decodable image: {reason}")]
    MalformedImage { field: &'static str, reason: String },

    #[error("no style {style_index} for type {type_index} in the style catalog")]
    UnknownStyle { type_index: usize, style_index: usize },
}

/// Discriminant of a [`ValidationError`], used as the wire error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    OutOfRange,
    MalformedImage,
    UnknownStyle,
}

impl ValidationKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfRange => "out_of_range",
            Self::MalformedImage => "malformed_image",
            Self::UnknownStyle => "unknown_style",
        }
    }
}

impl ValidationError {
    pub fn out_of_range(
        field: &'static str,
        min: impl ToString,
        max: impl ToString,
        value: impl ToString,
    ) -> Self {
        Self::OutOfRange {
            field,
            min: min.to_string(),
            max: max.to_string(),
            value: value.to_string(),
        }
    }

    /// Name of the offending request field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::OutOfRange { field, .. } | Self::MalformedImage { field, .. } => field,
            Self::UnknownStyle { .. } => "style_index",
        }
    }

    pub fn kind(&self) -> ValidationKind {
        match self {
            Self::OutOfRange { .. } => ValidationKind::OutOfRange,
            Self::MalformedImage { .. } => ValidationKind::MalformedImage,
            Self::UnknownStyle { .. } => ValidationKind::UnknownStyle,
        }
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Engine '{0}' is not ready")]
    EngineUnavailable(EngineVariant),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Collapse any failure raised inside an engine call into `Engine`.
    pub fn into_engine_error(self) -> Self {
        match self {
            e @ (AppError::Engine(_) | AppError::EngineUnavailable(_) | AppError::Timeout(_)) => e,
            other => AppError::Engine(other.to_string()),
        }
    }
}

/// Error response format
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", Some("invalid_json")),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "engine_error", None),
            AppError::Image(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", Some("malformed_image")),
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "invalid_request_error", Some(e.kind().code())),
            AppError::Engine(_) => (StatusCode::INTERNAL_SERVER_ERROR, "engine_error", None),
            AppError::EngineUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "engine_error", Some("engine_not_ready")),
            AppError::Resource(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", Some("resource_error")),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error", None),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", None),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout_error", None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
        };

        let param = match &self {
            AppError::Validation(e) => Some(e.field().to_string()),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
                param,
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
