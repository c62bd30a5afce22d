use {
    super::error::PaymentError,
    super::id::PaymentId,
    super::metadata::Metadata,
    super::money::{Currency, MoneyAmount},
    super::payment::PaymentStatus,
    std::{future::Future, pin::Pin},
};

/// What the service layer asks the provider to create.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: MoneyAmount,
    pub currency: Currency,
    pub provider_id: String,
    pub metadata: Metadata,
}

/// What the provider returned after accepting a payment.
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub id: PaymentId,
    pub status: PaymentStatus,
    pub resource_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthorizationFlow {
    pub redirect_uri: String,
    pub status: Option<PaymentStatus>,
}

/// Current provider-side view of a payment.
#[derive(Debug, Clone)]
pub struct FetchedPayment {
    pub id: PaymentId,
    pub status: PaymentStatus,
    pub amount_in_minor: i64,
    pub currency: String,
}

/// An inbound signed notification, exactly as received.
#[derive(Debug, Clone, Copy)]
pub struct SignedWebhook<'a> {
    pub signature: &'a str,
    pub raw_body: &'a [u8],
    pub path: &'a str,
    pub headers: &'a http::HeaderMap,
}

pub trait PaymentGateway: Send + Sync {
    fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CreatedPayment, PaymentError>> + Send + '_>>;

    fn start_authorization_flow(
        &self,
        payment_id: &PaymentId,
        return_uri: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AuthorizationFlow, PaymentError>> + Send + '_>>;

    fn get_payment_status(
        &self,
        payment_id: &PaymentId,
    ) -> Pin<Box<dyn Future<Output = Result<FetchedPayment, PaymentError>> + Send + '_>>;

    /// Never fails: any verification problem is reported as `false`.
    fn verify_webhook_signature<'a>(
        &'a self,
        webhook: SignedWebhook<'a>,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}
