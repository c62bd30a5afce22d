//! Normalizes provider faults into [`PaymentError`]s.
//!
//! Classification is pure and total: every input yields a populated error.

use super::error::{ErrorCode, PaymentError};

struct Baseline {
    code: ErrorCode,
    retryable: bool,
    user_message: &'static str,
}

fn baseline_for_status(http_status: u16) -> Baseline {
    let (code, retryable, user_message) = match http_status {
        400 => (
            ErrorCode::InvalidPaymentRequest,
            false,
            "The payment request is invalid. Please check your details.",
        ),
        401 => (
            ErrorCode::AuthFailed,
            true,
            "Authentication failed. Please try again.",
        ),
        403 => (
            ErrorCode::InvalidCredentials,
            false,
            "Access denied. Please contact support.",
        ),
        404 => (
            ErrorCode::PaymentCreationFailed,
            false,
            "Payment resource not found.",
        ),
        409 => (
            ErrorCode::PaymentCreationFailed,
            false,
            "A conflict occurred. This payment may already exist.",
        ),
        422 => (
            ErrorCode::ValidationError,
            false,
            "The payment details provided are invalid.",
        ),
        429 => (
            ErrorCode::RateLimitExceeded,
            true,
            "Too many requests. Please try again in a moment.",
        ),
        500 | 502 | 503 => (
            ErrorCode::ServiceUnavailable,
            true,
            "The payment service is temporarily unavailable. Please try again later.",
        ),
        504 => (
            ErrorCode::PaymentTimeout,
            true,
            "The request timed out. Please try again.",
        ),
        _ => (
            ErrorCode::UnknownError,
            true,
            "An unexpected error occurred. Please try again.",
        ),
    };
    Baseline {
        code,
        retryable,
        user_message,
    }
}

fn override_for_type(error_type: &str) -> Option<Baseline> {
    if error_type.contains("insufficient_funds") {
        Some(Baseline {
            code: ErrorCode::InsufficientFunds,
            retryable: false,
            user_message: "Insufficient funds available for this payment.",
        })
    } else if error_type.contains("provider_") || error_type.contains("bank_") {
        Some(Baseline {
            code: ErrorCode::ProviderNotAvailable,
            retryable: true,
            user_message: "The selected bank provider is currently unavailable.",
        })
    } else if error_type.contains("cancelled") || error_type.contains("rejected") {
        Some(Baseline {
            code: ErrorCode::UserCancelled,
            retryable: false,
            user_message: "The payment was cancelled.",
        })
    } else {
        None
    }
}

/// Maps a provider HTTP failure to a domain error.
///
/// The status decides the baseline; a recognised substring in the
/// provider error type then overrides it.
pub fn classify_provider_error(
    http_status: u16,
    provider_error_type: Option<&str>,
    raw_message: &str,
) -> PaymentError {
    let baseline = provider_error_type
        .and_then(override_for_type)
        .unwrap_or_else(|| baseline_for_status(http_status));

    let message = if raw_message.is_empty() {
        "Unknown error"
    } else {
        raw_message
    };

    PaymentError::new(baseline.code, message)
        .with_http_status(http_status)
        .with_retryable(baseline.retryable)
        .with_user_message(baseline.user_message)
}

/// Result of classifying a `payment_failed` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookFailure {
    pub code: ErrorCode,
    pub user_message: &'static str,
}

pub fn classify_webhook_failure(
    failure_reason: Option<&str>,
    failure_stage: Option<&str>,
) -> WebhookFailure {
    let reason = failure_reason.unwrap_or_default().to_lowercase();
    let stage = failure_stage.unwrap_or_default().to_lowercase();

    let (code, user_message) = if reason.contains("insufficient_funds") || reason.contains("nsf") {
        (
            ErrorCode::InsufficientFunds,
            "The payment failed due to insufficient funds.",
        )
    } else if reason.contains("cancel") || reason.contains("reject") {
        (
            ErrorCode::UserCancelled,
            "The payment was cancelled or rejected.",
        )
    } else if reason.contains("timeout") || reason.contains("expired") {
        (ErrorCode::PaymentTimeout, "The payment request timed out.")
    } else if stage.contains("authorization") {
        (
            ErrorCode::AuthorizationFailed,
            "Payment authorization failed. Please try again.",
        )
    } else if stage.contains("execution") {
        (
            ErrorCode::PaymentExecutionFailed,
            "Payment execution failed. Please contact support.",
        )
    } else {
        (
            ErrorCode::PaymentRejected,
            "The payment was rejected. Please try a different payment method.",
        )
    };

    WebhookFailure { code, user_message }
}
