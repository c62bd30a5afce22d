use {
    super::{
        signing::{self, Jwks, RequestSigner, SigningError, VerifyRequest},
        types::{
            AuthorizationFlowBody, AuthorizationFlowResponse, CreatePaymentBody,
            CreatePaymentResponse, PaymentStatusResponse, ProviderErrorBody, RedirectBody,
            TokenResponse, decode,
        },
    },
    crate::{
        adapters::http::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestClient},
        domain::{
            error::{ErrorCode, PaymentError},
            id::PaymentId,
            payment::PaymentStatus,
            provider::{
                AuthorizationFlow, CreatedPayment, FetchedPayment, PaymentGateway,
                PaymentRequest, SignedWebhook,
            },
            taxonomy::classify_provider_error,
        },
        services::retry::RetryPolicy,
    },
    http::{HeaderValue, header},
    std::{
        future::Future,
        pin::Pin,
        sync::{Mutex, PoisonError},
        time::Duration,
    },
    tokio::time::Instant,
    uuid::Uuid,
};

/// Key-set origins a webhook signature may point at.
pub const ALLOWED_JKUS: [&str; 2] = [
    "https://webhooks.truelayer.com/.well-known/jwks",
    "https://webhooks.truelayer-sandbox.com/.well-known/jwks",
];

const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);
const CREATE_TIMEOUT: Duration = Duration::from_secs(30);
const AUTH_FLOW_TIMEOUT: Duration = Duration::from_secs(15);
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);
const JWKS_TIMEOUT: Duration = Duration::from_secs(10);

const TOKEN_TTL: Duration = Duration::from_secs(55 * 60);
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_base_url: String,
    pub auth_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub merchant_account_id: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Client for the provider's payments API.
///
/// Constructed once at startup and shared. The only mutable state is the
/// access-token cache; two concurrent refreshes may both hit the token
/// endpoint and the last one wins.
pub struct TrueLayerClient<H = ReqwestClient> {
    http: H,
    settings: ProviderSettings,
    signer: RequestSigner,
    retry: RetryPolicy,
    token: Mutex<Option<CachedToken>>,
}

impl<H: HttpClient> TrueLayerClient<H> {
    pub fn new(http: H, settings: ProviderSettings, signer: RequestSigner, retry: RetryPolicy) -> Self {
        Self {
            http,
            settings,
            signer,
            retry,
            token: Mutex::new(None),
        }
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|t| Instant::now() < t.expires_at)
            .map(|t| t.value.clone())
    }

    fn store_token(&self, value: String, expires_in: Option<u64>) {
        let ttl = expires_in
            .map(|secs| Duration::from_secs(secs).saturating_sub(TOKEN_EXPIRY_MARGIN))
            .filter(|ttl| !ttl.is_zero())
            .map_or(TOKEN_TTL, |ttl| ttl.min(TOKEN_TTL));
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedToken {
            value,
            expires_at: Instant::now() + ttl,
        });
    }

    /// Client-credentials token, served from cache while valid.
    pub async fn access_token(&self) -> Result<String, PaymentError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("client_secret", &self.settings.client_secret)
            .append_pair("scope", "payments")
            .finish();
        let request = HttpRequest::post(endpoint(&self.settings.auth_base_url, "/connect/token")?)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .with_body(form.into_bytes())
            .with_timeout(TOKEN_TIMEOUT);

        let token = self
            .retry
            .execute("get access token", || async {
                let response = self.send(request.clone()).await?;
                decode::<TokenResponse>(&response.body, "token")
            })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "provider authentication failed");
                PaymentError::new(
                    ErrorCode::AuthFailed,
                    format!("failed to authenticate with provider: {}", e.message()),
                )
                .with_http_status(e.http_status())
                .with_retryable(true)
                .with_user_message("Authentication failed. Please try again later.")
                .with_source(e)
            })?;

        self.store_token(token.access_token.clone(), token.expires_in);
        Ok(token.access_token)
    }

    /// Sends once and classifies non-2xx responses.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PaymentError> {
        let response = self.http.request(request).await.map_err(transport_error)?;
        if response.is_success() {
            return Ok(response);
        }

        let body = ProviderErrorBody::parse(&response.body);
        let raw = response.body_text();
        let message = body.message().unwrap_or(raw.as_str());
        Err(classify_provider_error(
            response.status.as_u16(),
            body.error_type(),
            message,
        ))
    }

    /// Builds a signed POST with a fresh idempotency key.
    async fn signed_post(&self, path: &str, body: Vec<u8>, timeout: Duration) -> Result<HttpRequest, PaymentError> {
        let token = self.access_token().await?;
        let idempotency_key = Uuid::now_v7().to_string();
        let signature = self
            .signer
            .sign("POST", path, &[(IDEMPOTENCY_KEY, idempotency_key.as_str())], &body)
            .map_err(signing_failed)?;

        Ok(HttpRequest::post(endpoint(&self.settings.api_base_url, path)?)
            .with_header(header::AUTHORIZATION, bearer(&token)?)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_header(
                http::HeaderName::from_static("idempotency-key"),
                header_value(&idempotency_key)?,
            )
            .with_header(
                http::HeaderName::from_static("tl-signature"),
                header_value(&signature)?,
            )
            .with_body(body)
            .with_timeout(timeout))
    }

    #[tracing::instrument(skip(self, request), fields(provider_id = %request.provider_id, amount = request.amount.minor()))]
    async fn create(&self, request: &PaymentRequest) -> Result<CreatedPayment, PaymentError> {
        let path = "/v3/payments";
        let body = serde_json::to_vec(&CreatePaymentBody::bank_transfer(
            request.amount.minor(),
            request.currency.as_str(),
            &request.provider_id,
            &self.settings.merchant_account_id,
            &request.metadata,
        ))
        .map_err(|e| PaymentError::new(ErrorCode::InvalidPaymentRequest, e.to_string()).with_source(e))?;
        let http_request = self.signed_post(path, body, CREATE_TIMEOUT).await?;

        let context = format!("create payment (provider: {})", request.provider_id);
        let response = self
            .retry
            .execute(&context, || self.send(http_request.clone()))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "payment creation rejected"))?;

        let created: CreatePaymentResponse = decode(&response.body, "create payment")?;
        let id = PaymentId::new(created.id).map_err(|e| {
            PaymentError::new(ErrorCode::PaymentCreationFailed, "provider returned an empty payment id")
                .with_retryable(false)
                .with_source(e)
        })?;
        let status = PaymentStatus::try_from(created.status.as_str()).unwrap_or_else(|_| {
            tracing::warn!(payment_id = %id, status = %created.status, "unrecognised creation status");
            PaymentStatus::AuthorizationRequired
        });

        tracing::info!(payment_id = %id, %status, "payment created with provider");
        Ok(CreatedPayment {
            id,
            status,
            resource_token: created.resource_token,
        })
    }

    #[tracing::instrument(skip(self, payment_id), fields(payment_id = %payment_id))]
    async fn authorization_flow(&self, payment_id: &PaymentId, return_uri: &str) -> Result<AuthorizationFlow, PaymentError> {
        let path = format!("/v3/payments/{payment_id}/authorization-flow");
        let body = serde_json::to_vec(&AuthorizationFlowBody {
            redirect: RedirectBody { return_uri },
        })
        .map_err(|e| PaymentError::new(ErrorCode::AuthorizationFailed, e.to_string()).with_source(e))?;
        let http_request = self.signed_post(&path, body, AUTH_FLOW_TIMEOUT).await?;

        let context = format!("start authorization flow (payment: {payment_id})");
        let response = self
            .retry
            .execute(&context, || self.send(http_request.clone()))
            .await
            .map_err(|e| e.with_payment_id(payment_id.clone()))?;

        let flow: AuthorizationFlowResponse = decode(&response.body, "authorization flow")?;
        match flow.next_action() {
            Some(next) if next.kind == "redirect" && next.uri.is_some() => Ok(AuthorizationFlow {
                redirect_uri: next.uri.clone().unwrap_or_default(),
                status: flow
                    .status
                    .as_deref()
                    .and_then(|s| PaymentStatus::try_from(s).ok()),
            }),
            other => {
                let kind = other.map_or("unknown", |n| n.kind.as_str());
                Err(PaymentError::new(
                    ErrorCode::AuthorizationFailed,
                    format!("no redirect URL returned, next action was '{kind}'"),
                )
                .with_http_status(500)
                .with_retryable(false)
                .with_payment_id(payment_id.clone())
                .with_user_message("Unable to start payment authorization. Please try again."))
            }
        }
    }

    #[tracing::instrument(skip(self, payment_id), fields(payment_id = %payment_id))]
    async fn status(&self, payment_id: &PaymentId) -> Result<FetchedPayment, PaymentError> {
        let lookup = async {
            let token = self.access_token().await?;
            let request = HttpRequest::get(endpoint(
                &self.settings.api_base_url,
                &format!("/v3/payments/{payment_id}"),
            )?)
            .with_header(header::AUTHORIZATION, bearer(&token)?)
            .with_timeout(STATUS_TIMEOUT);

            let context = format!("get payment status (payment: {payment_id})");
            let response = self
                .retry
                .execute(&context, || self.send(request.clone()))
                .await?;
            let body: PaymentStatusResponse = decode(&response.body, "payment status")?;
            let status = PaymentStatus::try_from(body.status.as_str())?;
            Ok::<_, PaymentError>(FetchedPayment {
                id: PaymentId::new(body.id)?,
                status,
                amount_in_minor: body.amount_in_minor,
                currency: body.currency,
            })
        };

        lookup.await.map_err(|e| {
            PaymentError::new(
                ErrorCode::PaymentCreationFailed,
                format!("failed to get payment status: {}", e.message()),
            )
            .with_http_status(e.http_status())
            .with_retryable(true)
            .with_payment_id(payment_id.clone())
            .with_user_message("Unable to retrieve payment status. Please try again.")
            .with_source(e)
        })
    }

    async fn fetch_jwks(&self, jku: &str) -> Result<Jwks, PaymentError> {
        let url = url::Url::parse(jku)
            .map_err(|e| PaymentError::new(ErrorCode::WebhookVerificationFailed, e.to_string()))?;
        let response = self
            .send(HttpRequest::get(url).with_timeout(JWKS_TIMEOUT))
            .await?;
        decode(&response.body, "jwks")
    }

    /// Never errors; every failure is logged and reported as `false`.
    pub async fn verify_webhook(&self, webhook: SignedWebhook<'_>) -> bool {
        let jku = match signing::extract_jku(webhook.signature) {
            Ok(Some(jku)) => jku,
            Ok(None) => {
                tracing::error!("no jku in webhook signature");
                return false;
            }
            Err(e) => {
                tracing::error!(error = %e, "unreadable webhook signature");
                return false;
            }
        };
        if !ALLOWED_JKUS.contains(&jku.as_str()) {
            tracing::error!(%jku, "jku not from an allowed origin");
            return false;
        }

        let jwks = match self.fetch_jwks(&jku).await {
            Ok(jwks) => jwks,
            Err(e) => {
                tracing::error!(error = %e, %jku, "failed to fetch webhook key set");
                return false;
            }
        };

        let request = VerifyRequest {
            method: "POST",
            path: webhook.path,
            headers: webhook.headers,
            body: webhook.raw_body,
        };
        match signing::verify(&jwks, webhook.signature, request) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, path = webhook.path, body_len = webhook.raw_body.len(), "webhook signature verification failed");
                false
            }
        }
    }
}

impl<H: HttpClient + 'static> PaymentGateway for TrueLayerClient<H> {
    fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CreatedPayment, PaymentError>> + Send + '_>> {
        let request = request.clone();
        Box::pin(async move { self.create(&request).await })
    }

    fn start_authorization_flow(
        &self,
        payment_id: &PaymentId,
        return_uri: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AuthorizationFlow, PaymentError>> + Send + '_>> {
        let payment_id = payment_id.clone();
        let return_uri = return_uri.to_string();
        Box::pin(async move { self.authorization_flow(&payment_id, &return_uri).await })
    }

    fn get_payment_status(
        &self,
        payment_id: &PaymentId,
    ) -> Pin<Box<dyn Future<Output = Result<FetchedPayment, PaymentError>> + Send + '_>> {
        let payment_id = payment_id.clone();
        Box::pin(async move { self.status(&payment_id).await })
    }

    fn verify_webhook_signature<'a>(
        &'a self,
        webhook: SignedWebhook<'a>,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(self.verify_webhook(webhook))
    }
}

fn endpoint(base: &str, path: &str) -> Result<url::Url, PaymentError> {
    url::Url::parse(&format!("{}{}", base.trim_end_matches('/'), path))
        .map_err(|e| PaymentError::configuration(format!("invalid provider url {base}{path}: {e}")))
}

fn header_value(value: &str) -> Result<HeaderValue, PaymentError> {
    HeaderValue::from_str(value)
        .map_err(|e| PaymentError::new(ErrorCode::UnknownError, format!("invalid header value: {e}")))
}

fn bearer(token: &str) -> Result<HeaderValue, PaymentError> {
    header_value(&format!("Bearer {token}"))
}

fn signing_failed(err: SigningError) -> PaymentError {
    PaymentError::configuration(format!("failed to sign request: {err}")).with_source(err)
}

fn transport_error(err: HttpError) -> PaymentError {
    match err {
        HttpError::Timeout => PaymentError::new(ErrorCode::PaymentTimeout, "provider request timed out")
            .with_retryable(true)
            .with_user_message("The payment provider took too long to respond. Please try again."),
        HttpError::InvalidUrl(url) => PaymentError::configuration(format!("invalid provider url: {url}")),
        err @ HttpError::Connection(_) => PaymentError::new(ErrorCode::NetworkError, err.to_string())
            .with_retryable(true)
            .with_user_message("Network error. Please check your connection and try again.")
            .with_source(err),
    }
}
