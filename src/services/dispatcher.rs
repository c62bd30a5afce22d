//! Authenticates inbound webhooks and drives lifecycle transitions.

use {
    super::retry::RetryPolicy,
    crate::domain::{
        error::{ErrorCode, PaymentError},
        id::PaymentId,
        lifecycle::TransitionOutcome,
        provider::{PaymentGateway, SignedWebhook},
        store::PaymentStore,
        webhook::WebhookEvent,
    },
    chrono::Utc,
    serde::Deserialize,
    serde_json::Value,
    std::sync::Arc,
    thiserror::Error,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingPaymentId,
    UnknownEventType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied {
        payment_id: PaymentId,
        event_type: &'static str,
        outcome: TransitionOutcome,
    },
    /// Accepted but ignored.
    Dropped(DropReason),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("missing signature")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Processing(PaymentError),
}

/// Just enough of the envelope to route and log before full decoding.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<Value>,
    event_id: Option<String>,
    payment_id: Option<String>,
}

pub struct WebhookDispatcher {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn PaymentStore>,
    store_retry: RetryPolicy,
}

impl WebhookDispatcher {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn PaymentStore>, store_retry: RetryPolicy) -> Self {
        Self {
            gateway,
            store,
            store_retry,
        }
    }

    /// Verifies, decodes and applies one notification.
    ///
    /// The signature is checked against `raw_body` exactly as received and
    /// the full request `path`. Unknown event types and events without a
    /// payment id are dropped, not errors.
    pub async fn dispatch(
        &self,
        signature: Option<&str>,
        raw_body: &[u8],
        path: &str,
        headers: &http::HeaderMap,
    ) -> Result<DispatchOutcome, DispatchError> {
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or(DispatchError::MissingSignature)?;

        let verified = self
            .gateway
            .verify_webhook_signature(SignedWebhook {
                signature,
                raw_body,
                path,
                headers,
            })
            .await;
        if !verified {
            tracing::error!(path, body_len = raw_body.len(), "invalid webhook signature");
            return Err(DispatchError::InvalidSignature);
        }

        let envelope: Envelope =
            serde_json::from_slice(raw_body).map_err(|e| DispatchError::Malformed(e.to_string()))?;
        let kind = envelope.kind.as_ref().and_then(Value::as_str);
        tracing::info!(
            event_type = kind.unwrap_or("<none>"),
            event_id = envelope.event_id.as_deref().unwrap_or("<none>"),
            payment_id = envelope.payment_id.as_deref().unwrap_or("<none>"),
            "processing webhook"
        );

        if envelope.payment_id.as_deref().is_none_or(|id| id.trim().is_empty()) {
            tracing::warn!("webhook without payment_id dropped");
            return Ok(DispatchOutcome::Dropped(DropReason::MissingPaymentId));
        }

        let Some(kind) = kind else {
            let raw_kind = envelope.kind.as_ref().map(Value::to_string).unwrap_or_default();
            tracing::warn!(event_type = %raw_kind, "webhook without a string type dropped");
            return Ok(DispatchOutcome::Dropped(DropReason::UnknownEventType(raw_kind)));
        };

        let event: WebhookEvent =
            serde_json::from_slice(raw_body).map_err(|e| DispatchError::Malformed(e.to_string()))?;
        if matches!(event, WebhookEvent::Unknown) {
            tracing::warn!(event_type = kind, "no handler for webhook type, dropped");
            return Ok(DispatchOutcome::Dropped(DropReason::UnknownEventType(kind.to_string())));
        }

        let Some(update) = event.transition(Utc::now()) else {
            return Ok(DispatchOutcome::Dropped(DropReason::MissingPaymentId));
        };
        log_event(&event);

        let payment_id = update.payment_id.clone();
        let outcome = self
            .store_retry
            .execute("apply webhook status update", || self.store.update_status(update.clone()))
            .await
            .map_err(|e| {
                DispatchError::Processing(
                    PaymentError::new(
                        ErrorCode::WebhookProcessingFailed,
                        format!("failed to apply {}: {e}", event.event_type()),
                    )
                    .with_retryable(true)
                    .with_payment_id(payment_id.clone())
                    .with_source(e),
                )
            })?;

        tracing::info!(
            %payment_id,
            event_type = event.event_type(),
            status = %outcome.status(),
            "webhook applied"
        );
        Ok(DispatchOutcome::Applied {
            payment_id,
            event_type: event.event_type(),
            outcome,
        })
    }
}

fn log_event(event: &WebhookEvent) {
    match event {
        WebhookEvent::PaymentSettlementStalled(e) => tracing::warn!(
            payment_id = e.header.payment_id.as_deref().unwrap_or_default(),
            threshold_seconds = e.stalled_threshold_seconds,
            "settlement stalled"
        ),
        WebhookEvent::PaymentFailed(e) => tracing::warn!(
            payment_id = e.header.payment_id.as_deref().unwrap_or_default(),
            failure_reason = e.failure_reason.as_deref().unwrap_or_default(),
            failure_stage = e.failure_stage.as_deref().unwrap_or_default(),
            "payment failed"
        ),
        WebhookEvent::PaymentDisputed(e) => tracing::warn!(
            payment_id = e.header.payment_id.as_deref().unwrap_or_default(),
            reason = e.dispute_reason.as_deref().unwrap_or_default(),
            "payment disputed"
        ),
        WebhookEvent::PaymentReversed(e) => tracing::warn!(
            payment_id = e.header.payment_id.as_deref().unwrap_or_default(),
            reason = e.reversal_reason.as_deref().unwrap_or_default(),
            "payment reversed"
        ),
        _ => {}
    }
}
