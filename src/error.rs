use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ApiResponse;

pub type Result<T> = std::result::Result<T, LoanError>;

#[derive(Debug, Error)]
pub enum LoanError {
    /// A required field is absent and has no imputation value, or a
    /// feature vector does not match the model's input width.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("unknown category `{value}` for `{field}` (expected one of: {expected})")]
    UnknownCategory {
        field: String,
        value: String,
        expected: String,
    },

    #[error("model artifact is not loaded")]
    ModelNotLoaded,

    #[error("invalid model artifact: {0}")]
    Artifact(String),

    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("bad upload: {0}")]
    Upload(String),
}

impl LoanError {
    pub fn missing_field(field: &str) -> Self {
        LoanError::SchemaMismatch(format!("missing required field `{}`", field))
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        LoanError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the submitted data rather than the server.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            LoanError::SchemaMismatch(_)
                | LoanError::InvalidValue { .. }
                | LoanError::UnknownCategory { .. }
                | LoanError::Json(_)
                | LoanError::Upload(_)
        )
    }
}

impl ResponseError for LoanError {
    fn status_code(&self) -> StatusCode {
        match self {
            e if e.is_input_error() => StatusCode::BAD_REQUEST,
            LoanError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::error(&self.to_string()))
    }
}
