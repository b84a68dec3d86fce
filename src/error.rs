use crate::auth::AuthError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed client input, e.g. a field that should carry JSON but does not.
    #[error("{0}")]
    ClientInput(String),
    #[error("{}", .0.message())]
    Authentication(AuthError),
    /// Input that parsed fine but breaks a business rule.
    #[error("{0}")]
    Validation(String),
    /// A handler needed a string field the request did not carry.
    #[error("required string field `{0}` is missing")]
    MissingField(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ClientInput(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::MissingField(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        Self::Authentication(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::ClientInput(message) => json!({ "error": message }),
            Self::Authentication(error) => json!({ "message": error.message() }),
            Self::Validation(message) => json!({ "message": message }),
            Self::MissingField(field) => {
                tracing::error!(field = *field, "handler failed on missing field");
                json!({ "error": "internal_error" })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use crate::auth::AuthError;
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    async fn body_of(error: ApiError) -> (StatusCode, String) {
        let response = error.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        (
            status,
            String::from_utf8(body.to_vec()).expect("body should be utf8"),
        )
    }

    #[tokio::test]
    async fn client_input_uses_error_key() {
        let (status, body) =
            body_of(ApiError::ClientInput("Invalid JSON in complex_object".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, r#"{"error":"Invalid JSON in complex_object"}"#);
    }

    #[tokio::test]
    async fn authentication_uses_message_key() {
        let (status, body) = body_of(AuthError::MissingHeader.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, r#"{"message":"Missing Authorization Header"}"#);
    }

    #[tokio::test]
    async fn missing_field_is_internal() {
        let (status, body) = body_of(ApiError::MissingField("name")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, r#"{"error":"internal_error"}"#);
    }

    #[test]
    fn display_matches_client_message() {
        assert_eq!(
            ApiError::from(AuthError::InvalidCredentials).to_string(),
            "Invalid Authentication Credentials"
        );
    }
}
