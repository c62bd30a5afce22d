//! Synchronous payment legs: creation and the browser callback.

use {
    super::retry::RetryPolicy,
    crate::domain::{
        error::{ErrorCode, PaymentError},
        id::PaymentId,
        metadata::Metadata,
        money::{Currency, Money, MoneyAmount},
        payment::{NewPayment, Payment, PaymentStatus, StatusUpdate, UpdateOrigin},
        provider::{FetchedPayment, PaymentGateway, PaymentRequest},
        store::PaymentStore,
    },
    chrono::{SecondsFormat, Utc},
    serde::Deserialize,
    serde_json::Value,
    std::sync::Arc,
};

/// Creation request as received from the caller, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePaymentInput {
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPaymentView {
    pub payment_id: PaymentId,
    pub hpp_url: String,
}

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Return URI handed to the provider's authorization flow.
    pub callback_url: Option<String>,
    pub merchant_currency: Currency,
}

pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn PaymentStore>,
    store_retry: RetryPolicy,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn PaymentStore>,
        store_retry: RetryPolicy,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            gateway,
            store,
            store_retry,
            settings,
        }
    }

    fn validate(&self, input: CreatePaymentInput) -> Result<PaymentRequest, PaymentError> {
        let provider_id = input
            .provider_id
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                PaymentError::validation(
                    "missing required field: provider_id",
                    "Please select a payment provider.",
                )
            })?;

        let invalid_amount = || {
            PaymentError::validation(
                "invalid amount, must be a positive integer in minor units",
                "Please enter a valid payment amount.",
            )
        };
        let amount = input
            .amount
            .as_ref()
            .and_then(Value::as_i64)
            .ok_or_else(invalid_amount)
            .and_then(|minor| MoneyAmount::new(minor).map_err(|_| invalid_amount()))?;

        let currency = match input.currency.as_deref() {
            None | Some("") => self.settings.merchant_currency,
            Some(code) => Currency::try_from(code)?,
        };

        Ok(PaymentRequest {
            amount,
            currency,
            provider_id,
            metadata: input.metadata.map(Metadata::from_value).unwrap_or_default(),
        })
    }

    /// Creates the payment with the provider, starts its authorization flow
    /// and records it locally.
    ///
    /// Local persistence failures are logged and swallowed: once the
    /// provider has accepted the payment the caller always gets the
    /// redirect URL.
    pub async fn create_payment(&self, input: CreatePaymentInput) -> Result<CreatedPaymentView, PaymentError> {
        let request = self.validate(input)?;
        let callback_url = self
            .settings
            .callback_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PaymentError::configuration("callback url is not configured"))?;

        tracing::info!(
            amount = request.amount.minor(),
            currency = request.currency.as_str(),
            provider_id = %request.provider_id,
            "creating payment"
        );

        let created = self.gateway.create_payment(&request).await?;
        let flow = self
            .gateway
            .start_authorization_flow(&created.id, callback_url)
            .await
            .map_err(|e| e.with_payment_id(created.id.clone()))?;
        tracing::info!(payment_id = %created.id, "authorization flow started");

        let new = NewPayment {
            id: created.id.clone(),
            money: Money::new(request.amount, request.currency),
            status: created.status,
            hpp_url: Some(flow.redirect_uri.clone()),
            metadata: request.metadata,
        };
        let mut started = Metadata::new();
        started.set("authorizationStartedAt", now_rfc3339());
        let update = StatusUpdate {
            payment_id: created.id.clone(),
            status: flow.status.unwrap_or(PaymentStatus::Authorizing),
            metadata: started,
            origin: UpdateOrigin::AuthorizationFlow,
        };
        self.record_creation(new, update).await;

        Ok(CreatedPaymentView {
            payment_id: created.id,
            hpp_url: flow.redirect_uri,
        })
    }

    async fn record_creation(&self, new: NewPayment, update: StatusUpdate) {
        let payment_id = new.id.clone();
        let result = self
            .store_retry
            .execute("persist new payment", || self.store.create(new.clone()))
            .await;
        if let Err(e) = result {
            tracing::error!(%payment_id, error = %e, "failed to save payment record");
            return;
        }
        self.record_update(update).await;
    }

    async fn record_update(&self, update: StatusUpdate) {
        let payment_id = update.payment_id.clone();
        match self
            .store_retry
            .execute("persist status update", || self.store.update_status(update.clone()))
            .await
        {
            Ok(outcome) => tracing::debug!(%payment_id, ?outcome, "status update recorded"),
            Err(e) => tracing::error!(%payment_id, error = %e, "failed to save status update"),
        }
    }

    /// Browser returned from the hosted page: poll the provider and record
    /// what it says. Webhooks stay authoritative; the lifecycle rules
    /// refuse anything that would move the payment backwards.
    pub async fn handle_callback(&self, payment_id: &PaymentId) -> Result<FetchedPayment, PaymentError> {
        tracing::info!(%payment_id, "payment callback received");
        let fetched = self.gateway.get_payment_status(payment_id).await?;
        tracing::info!(%payment_id, status = %fetched.status, "provider status fetched");

        let mut metadata = Metadata::new();
        metadata.set("callbackReceivedAt", now_rfc3339());
        self.record_update(StatusUpdate {
            payment_id: payment_id.clone(),
            status: fetched.status,
            metadata,
            origin: UpdateOrigin::Callback,
        })
        .await;

        Ok(fetched)
    }

    pub async fn get_payment(&self, payment_id: &PaymentId) -> Result<Payment, PaymentError> {
        self.store.get(payment_id).await?.ok_or_else(|| {
            PaymentError::new(ErrorCode::InvalidPaymentRequest, format!("payment {payment_id} not found"))
                .with_http_status(404)
                .with_payment_id(payment_id.clone())
                .with_user_message("Payment not found.")
        })
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
