use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Return code carried in successful conversion responses.
pub const RETURN_CODE_SUCCESS: u16 = 100;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Chain endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Partial chain data: {0}")]
    PartialData(String),

    #[error("Fee sum overflowed at block {0}")]
    FeeOverflow(u64),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OracleError {
    /// Critical errors stop the whole process instead of a single tick.
    pub fn is_critical(&self) -> bool {
        matches!(self, OracleError::Persistence(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OracleError::NotFound(_) => StatusCode::NOT_FOUND,
            OracleError::Conversion(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OracleError::Unavailable(_) | OracleError::Persistence(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            OracleError::Unavailable(_) => "UNAVAILABLE",
            OracleError::NotFound(_) => "NOT_FOUND",
            OracleError::PartialData(_) | OracleError::FeeOverflow(_) => "PARTIAL_DATA",
            OracleError::Persistence(_) => "PERSISTENCE_ERROR",
            OracleError::Conversion(_) => "CONVERSION_ERROR",
            OracleError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ethers::providers::ProviderError> for OracleError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        OracleError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(err: serde_json::Error) -> Self {
        OracleError::Internal(format!("malformed stored value: {err}"))
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for OracleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        };

        tracing::error!(
            error = ?self,
            error_code = error_code,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}
