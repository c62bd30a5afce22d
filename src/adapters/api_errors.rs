use {
    crate::{domain::error::PaymentError, services::dispatcher::DispatchError},
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::json,
};

/// Newtype so the domain error can be rendered by axum.
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(code = %err.code(), payment_id = ?err.payment_id(), "{err}");
        } else {
            tracing::warn!(code = %err.code(), payment_id = ?err.payment_id(), "{err}");
        }

        let mut details = json!({ "retryable": err.retryable() });
        if let Some(payment_id) = err.payment_id() {
            details["payment_id"] = json!(payment_id);
        }
        let body = json!({
            "code": err.code(),
            "message": err.user_message(),
            "details": details,
        });

        (status, Json(body)).into_response()
    }
}

/// Rendering of webhook rejections. The provider only reads the status.
pub struct WebhookRejection(pub DispatchError);

impl From<DispatchError> for WebhookRejection {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            DispatchError::MissingSignature => {
                (StatusCode::UNAUTHORIZED, json!({ "error": "Missing signature." }))
            }
            DispatchError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, json!({ "error": "Invalid signature." }))
            }
            DispatchError::Malformed(reason) => {
                tracing::warn!(%reason, "malformed webhook payload");
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": "Malformed webhook payload." }),
                )
            }
            DispatchError::Processing(err) => {
                tracing::error!(code = %err.code(), payment_id = ?err.payment_id(), "webhook processing failed: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "Failed to process webhook.",
                        "message": err.user_message(),
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
