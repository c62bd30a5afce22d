use {
    super::id::PaymentId,
    chrono::{DateTime, Utc},
    serde::Serialize,
    std::fmt,
    thiserror::Error,
};

/// Closed set of machine-readable failure codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthFailed,
    InvalidCredentials,
    TokenExpired,
    PaymentCreationFailed,
    InvalidPaymentRequest,
    InsufficientFunds,
    ProviderNotAvailable,
    AuthorizationFailed,
    AuthorizationTimeout,
    UserCancelled,
    PaymentExecutionFailed,
    PaymentRejected,
    PaymentTimeout,
    WebhookVerificationFailed,
    WebhookProcessingFailed,
    PersistenceError,
    NetworkError,
    RateLimitExceeded,
    ServiceUnavailable,
    UnknownError,
    ValidationError,
    ConfigurationError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthFailed => "AUTH_FAILED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::PaymentCreationFailed => "PAYMENT_CREATION_FAILED",
            Self::InvalidPaymentRequest => "INVALID_PAYMENT_REQUEST",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::ProviderNotAvailable => "PROVIDER_NOT_AVAILABLE",
            Self::AuthorizationFailed => "AUTHORIZATION_FAILED",
            Self::AuthorizationTimeout => "AUTHORIZATION_TIMEOUT",
            Self::UserCancelled => "USER_CANCELLED",
            Self::PaymentExecutionFailed => "PAYMENT_EXECUTION_FAILED",
            Self::PaymentRejected => "PAYMENT_REJECTED",
            Self::PaymentTimeout => "PAYMENT_TIMEOUT",
            Self::WebhookVerificationFailed => "WEBHOOK_VERIFICATION_FAILED",
            Self::WebhookProcessingFailed => "WEBHOOK_PROCESSING_FAILED",
            Self::PersistenceError => "PERSISTENCE_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }

    /// HTTP status used when the code is rendered to a caller and no
    /// upstream status is known.
    pub fn default_http_status(&self) -> u16 {
        match self {
            Self::ValidationError | Self::InvalidPaymentRequest => 400,
            Self::AuthFailed | Self::TokenExpired | Self::WebhookVerificationFailed => 401,
            Self::InvalidCredentials => 403,
            Self::InsufficientFunds | Self::PaymentRejected | Self::UserCancelled => 422,
            Self::RateLimitExceeded => 429,
            Self::ServiceUnavailable | Self::ProviderNotAvailable | Self::NetworkError => 503,
            Self::PaymentTimeout | Self::AuthorizationTimeout => 504,
            Self::PaymentCreationFailed
            | Self::AuthorizationFailed
            | Self::PaymentExecutionFailed
            | Self::WebhookProcessingFailed
            | Self::PersistenceError
            | Self::UnknownError
            | Self::ConfigurationError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub const DEFAULT_USER_MESSAGE: &str = "An error occurred while processing your payment.";

/// A classified payment failure.
///
/// `message` and `source` are for logs only; callers only ever see
/// `code`, `user_message` and `retryable`.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct PaymentError {
    code: ErrorCode,
    message: String,
    http_status: u16,
    retryable: bool,
    user_message: String,
    payment_id: Option<PaymentId>,
    timestamp: DateTime<Utc>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PaymentError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            http_status: code.default_http_status(),
            retryable: false,
            user_message: DEFAULT_USER_MESSAGE.to_string(),
            payment_id: None,
            timestamp: Utc::now(),
            source: None,
        }
    }

    pub fn validation(message: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
            .with_http_status(400)
            .with_user_message(user_message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
            .with_user_message("Payment system is misconfigured. Please contact support.")
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = status;
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_user_message(mut self, user_message: impl Into<String>) -> Self {
        self.user_message = user_message.into();
        self
    }

    pub fn with_payment_id(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    pub fn retryable(&self) -> bool {
        self.retryable
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn payment_id(&self) -> Option<&PaymentId> {
        self.payment_id.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Failures of the record store. Never surfaced to callers directly.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        PaymentError::new(ErrorCode::PersistenceError, err.to_string())
            .with_retryable(true)
            .with_user_message("Failed to save payment information. Please try again.")
            .with_source(err)
    }
}
