use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use ferry_shared::identity::AuthError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("No token, authorization denied")]
    MissingToken,

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::MissingToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Auth(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
