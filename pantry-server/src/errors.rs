use axum::{
    http,
    response::{IntoResponse, Response},
    Json,
};
use pantry::{basic_models::ErrorResponse, editor::ValidationError};

pub type WebResult<T> = std::result::Result<T, WebError>;

#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Internal Server Error: {0}")]
    Internal(#[from] anyhow::Error),
    /// A backend call failed. Only `message` reaches the caller; `cause` is logged.
    #[error("{message}")]
    Backend {
        message: &'static str,
        cause: anyhow::Error,
    },
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Authentication error: {0}")]
    AuthFailure(String),
    #[error("Only the owner can change this recipe")]
    Forbidden,
    #[error("{0}")]
    Conflict(String),
    #[error("Not found")]
    NotFound,
}

impl WebError {
    /// Wrap a failure with the message the caller should see.
    pub fn backend(message: &'static str) -> impl FnOnce(anyhow::Error) -> WebError {
        move |cause| WebError::Backend { message, cause }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
            WebError::Backend { message, cause } => {
                tracing::error!("{} {:#}", message, cause);
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
            WebError::Validation(_) | WebError::BadRequest(_) => http::StatusCode::BAD_REQUEST,
            // Auth failures are always explained
            WebError::AuthFailure(_) => http::StatusCode::UNAUTHORIZED,
            WebError::Forbidden => http::StatusCode::FORBIDDEN,
            WebError::Conflict(_) => http::StatusCode::CONFLICT,
            WebError::NotFound => http::StatusCode::NOT_FOUND,
        };
        // Internal details stay in the log
        let error = match self {
            WebError::Internal(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
