//! Webhook event model and the per-event transition table.
//!
//! Each known event type is a variant of [`WebhookEvent`]; [`WebhookEvent::transition`]
//! is a pure function from payload to the [`StatusUpdate`] that must be applied.

use {
    super::id::{EventId, PaymentId},
    super::metadata::Metadata,
    super::payment::{PaymentStatus, StatusUpdate, UpdateOrigin},
    super::taxonomy::classify_webhook_failure,
    chrono::{DateTime, SecondsFormat, Utc},
    serde::Deserialize,
};

/// Fields every notification carries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventHeader {
    pub event_id: Option<String>,
    pub event_version: Option<u64>,
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Authorized {
    #[serde(flatten)]
    pub header: EventHeader,
    pub authorized_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Executed {
    #[serde(flatten)]
    pub header: EventHeader,
    pub executed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Creditable {
    #[serde(flatten)]
    pub header: EventHeader,
    pub creditable_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FundsReceived {
    #[serde(flatten)]
    pub header: EventHeader,
    pub funds_received_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SettlementStalled {
    #[serde(flatten)]
    pub header: EventHeader,
    pub settlement_stalled_at: Option<String>,
    pub stalled_threshold_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settled {
    #[serde(flatten)]
    pub header: EventHeader,
    pub settled_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Failed {
    #[serde(flatten)]
    pub header: EventHeader,
    pub failed_at: Option<String>,
    pub failure_reason: Option<String>,
    pub failure_stage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Disputed {
    #[serde(flatten)]
    pub header: EventHeader,
    pub disputed_at: Option<String>,
    pub dispute_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reversed {
    #[serde(flatten)]
    pub header: EventHeader,
    pub reversed_at: Option<String>,
    pub reversal_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebhookEvent {
    PaymentAuthorized(Authorized),
    PaymentExecuted(Executed),
    PaymentCreditable(Creditable),
    PaymentFundsReceived(FundsReceived),
    PaymentSettlementStalled(SettlementStalled),
    PaymentSettled(Settled),
    PaymentFailed(Failed),
    PaymentDisputed(Disputed),
    PaymentReversed(Reversed),
    #[serde(other)]
    Unknown,
}

impl WebhookEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PaymentAuthorized(_) => "payment_authorized",
            Self::PaymentExecuted(_) => "payment_executed",
            Self::PaymentCreditable(_) => "payment_creditable",
            Self::PaymentFundsReceived(_) => "payment_funds_received",
            Self::PaymentSettlementStalled(_) => "payment_settlement_stalled",
            Self::PaymentSettled(_) => "payment_settled",
            Self::PaymentFailed(_) => "payment_failed",
            Self::PaymentDisputed(_) => "payment_disputed",
            Self::PaymentReversed(_) => "payment_reversed",
            Self::Unknown => "unknown",
        }
    }

    pub fn header(&self) -> Option<&EventHeader> {
        match self {
            Self::PaymentAuthorized(e) => Some(&e.header),
            Self::PaymentExecuted(e) => Some(&e.header),
            Self::PaymentCreditable(e) => Some(&e.header),
            Self::PaymentFundsReceived(e) => Some(&e.header),
            Self::PaymentSettlementStalled(e) => Some(&e.header),
            Self::PaymentSettled(e) => Some(&e.header),
            Self::PaymentFailed(e) => Some(&e.header),
            Self::PaymentDisputed(e) => Some(&e.header),
            Self::PaymentReversed(e) => Some(&e.header),
            Self::Unknown => None,
        }
    }

    /// Computes the status update this event demands.
    ///
    /// `None` for unknown events and events without a usable `payment_id`.
    pub fn transition(&self, received_at: DateTime<Utc>) -> Option<StatusUpdate> {
        let header = self.header()?;
        let payment_id = PaymentId::new(header.payment_id.clone()?).ok()?;
        let received = received_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let or_received = |ts: &Option<String>| ts.clone().unwrap_or_else(|| received.clone());

        let mut metadata = Metadata::new();
        metadata
            .set("lastWebhookEventType", self.event_type())
            .set_opt("lastWebhookEventId", header.event_id.clone())
            .set_opt("lastWebhookEventVersion", header.event_version)
            .set("webhookReceivedAt", received.clone());

        let status = match self {
            Self::PaymentAuthorized(e) => {
                metadata.set("authorizedAt", or_received(&e.authorized_at));
                PaymentStatus::Authorized
            }
            Self::PaymentExecuted(e) => {
                metadata.set("executedAt", or_received(&e.executed_at));
                PaymentStatus::Executed
            }
            Self::PaymentCreditable(e) => {
                metadata
                    .set("creditableAt", or_received(&e.creditable_at))
                    .set("isCredited", true);
                PaymentStatus::Executed
            }
            Self::PaymentFundsReceived(e) => {
                metadata
                    .set("fundsReceivedAt", or_received(&e.funds_received_at))
                    .set("fundsReceived", true);
                PaymentStatus::Executed
            }
            Self::PaymentSettlementStalled(e) => {
                metadata
                    .set("settlementStalled", true)
                    .set("stalledAt", or_received(&e.settlement_stalled_at))
                    .set_opt("stalledThresholdSeconds", e.stalled_threshold_seconds);
                PaymentStatus::Executed
            }
            Self::PaymentSettled(e) => {
                metadata.set("settledAt", or_received(&e.settled_at));
                PaymentStatus::Settled
            }
            Self::PaymentFailed(e) => {
                let failure = classify_webhook_failure(
                    e.failure_reason.as_deref(),
                    e.failure_stage.as_deref(),
                );
                metadata
                    .set("failedAt", or_received(&e.failed_at))
                    .set_opt("failureReason", e.failure_reason.clone())
                    .set_opt("failureStage", e.failure_stage.clone())
                    .set("errorCode", failure.code.as_str())
                    .set("userMessage", failure.user_message);
                PaymentStatus::Failed
            }
            Self::PaymentDisputed(e) => {
                metadata
                    .set("disputed", true)
                    .set("disputedAt", or_received(&e.disputed_at))
                    .set_opt("disputeReason", e.dispute_reason.clone());
                PaymentStatus::Failed
            }
            Self::PaymentReversed(e) => {
                metadata
                    .set("reversed", true)
                    .set("reversedAt", or_received(&e.reversed_at))
                    .set_opt("reversalReason", e.reversal_reason.clone());
                PaymentStatus::Failed
            }
            Self::Unknown => return None,
        };

        Some(StatusUpdate {
            payment_id,
            status,
            metadata,
            origin: UpdateOrigin::Webhook {
                event_type: self.event_type(),
                event_id: header.event_id.clone().and_then(|id| EventId::new(id).ok()),
            },
        })
    }
}
