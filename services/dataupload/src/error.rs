use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Why a file's contents could not be turned into records
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("File is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("Malformed CSV at line {line}: {message}")]
    Csv { line: u64, message: String },

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected JSON shape: {0}")]
    Shape(String),
}

/// Errors surfaced by the upload and query operations
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Unsupported content type '{0}'. Only JSON and CSV files are allowed.")]
    UnsupportedContentType(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("No file provided")]
    MissingFile,

    #[error("Invalid multipart request: {0}")]
    InvalidMultipart(String),

    #[error("File exceeds the upload limit of {0} bytes")]
    FileTooLarge(usize),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            UploadError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable machine-readable code for API responses and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::UnsupportedContentType(_) => "UNSUPPORTED_CONTENT_TYPE",
            UploadError::UnsupportedFileType(_) => "UNSUPPORTED_FILE_TYPE",
            UploadError::Parse(_) => "PARSE_ERROR",
            UploadError::MissingFile => "MISSING_FILE",
            UploadError::InvalidMultipart(_) => "INVALID_MULTIPART",
            UploadError::FileTooLarge(_) => "FILE_TOO_LARGE",
            UploadError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            UploadError::Internal(e) => {
                error!(error = ?e, "Unexpected error while handling request");
                "An unexpected error occurred".to_string()
            }
            other => {
                warn!(code = other.code(), reason = %other, "Request rejected");
                other.to_string()
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}
