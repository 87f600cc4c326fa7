// Error handling and response codes for confit.
// Service errors map onto the stable wire codes carried in the response
// envelope; everything else surfaces as SERVER_ERROR.

use actix_web::HttpResponse;

use crate::model::common::Envelope;

// Stable wire codes. Empty string means success.
pub const BAD_REQUEST: &str = "BAD_REQUEST";
pub const NOT_PERMITTED: &str = "NOT_PERMITTED";
pub const DATA_VERSION_ERROR: &str = "DATA_VERSION_ERROR";
pub const SERVER_ERROR: &str = "SERVER_ERROR";
pub const SYNC_TARGET_FAILED: &str = "SYNC_TARGET_FAILED";

// Application-level error types
#[derive(thiserror::Error, Debug)]
pub enum ConfitError {
    #[error("bad request: {0}")]
    BadRequest(String), // Malformed payload or missing parameter
    #[error("not permitted: {0}")]
    NotPermitted(String), // Auth failure or role violation
    #[error("data version error: {0}")]
    DataVersion(String), // Version chain break on a slave
    #[error("store error: {0}")]
    Store(#[from] sea_orm::DbErr), // Database failures
    #[error("server error: {0}")]
    Internal(#[from] anyhow::Error), // Everything else
}

impl ConfitError {
    // Wire code for the unified response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ConfitError::BadRequest(_) => BAD_REQUEST,
            ConfitError::NotPermitted(_) => NOT_PERMITTED,
            ConfitError::DataVersion(_) => DATA_VERSION_ERROR,
            ConfitError::Store(_) | ConfitError::Internal(_) => SERVER_ERROR,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ConfitError::BadRequest(message.into())
    }

    pub fn not_permitted(message: impl Into<String>) -> Self {
        ConfitError::NotPermitted(message.into())
    }
}

impl actix_web::error::ResponseError for ConfitError {
    // Peer and operator clients read the envelope code, not the HTTP status,
    // so every error answers 200 with status=false like the rest of the API.
    fn error_response(&self) -> HttpResponse {
        tracing::warn!(code = self.code(), "request failed: {}", self);
        HttpResponse::Ok().json(Envelope::<()>::failure(self.code()))
    }
}
