//! Payment lifecycle rules.
//!
//! `authorization_required → authorizing → authorized → executed → settled`,
//! with `failed` reachable from every state except `failed` itself. A
//! settled payment may still fail (dispute or reversal); nothing else
//! moves a terminal payment. Stores call [`apply`] inside their critical
//! section so every writer goes through the same rules.

use {
    super::payment::{Payment, PaymentStatus, StatusChange, StatusUpdate},
    chrono::{DateTime, Utc},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentAction {
    /// Requested status equals the current one.
    SameStatus,
    /// Requested status would regress or leave a terminal state.
    LogAnomaly { current: PaymentStatus },
    Advance { old_status: PaymentStatus },
}

impl PaymentStatus {
    pub fn can_transition_to(&self, next: &PaymentStatus) -> bool {
        match (self, next) {
            (PaymentStatus::Failed, _) => false,
            (_, PaymentStatus::Failed) => true,
            (PaymentStatus::Settled, _) => false,
            (current, next) => next.rank() > current.rank(),
        }
    }

    pub fn decide(&self, next: &PaymentStatus) -> PaymentAction {
        if self == next {
            PaymentAction::SameStatus
        } else if self.can_transition_to(next) {
            PaymentAction::Advance { old_status: *self }
        } else {
            PaymentAction::LogAnomaly { current: *self }
        }
    }
}

/// What a store did with a [`StatusUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Advanced {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    /// Same status re-applied; metadata merged.
    Unchanged(PaymentStatus),
    /// Status kept; metadata merged for audit.
    Rejected {
        current: PaymentStatus,
        requested: PaymentStatus,
    },
    /// No record existed; a placeholder was created at the requested status.
    Recorded(PaymentStatus),
}

impl TransitionOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            Self::Advanced { to, .. } => *to,
            Self::Unchanged(s) | Self::Recorded(s) => *s,
            Self::Rejected { current, .. } => *current,
        }
    }
}

/// Applies `update` to `payment` (or creates a placeholder when absent).
///
/// Re-applying the same update yields `Unchanged` and leaves the record
/// equal apart from `updated_at`.
pub fn apply(
    payment: Option<Payment>,
    update: &StatusUpdate,
    now: DateTime<Utc>,
) -> (Payment, TransitionOutcome) {
    let change = StatusChange {
        status: update.status,
        at: now,
        event_type: Some(update.origin.event_type().to_string()),
        event_id: update.origin.event_id().map(str::to_string),
    };

    let Some(mut payment) = payment else {
        let mut payment = Payment::placeholder(update.payment_id.clone(), update.status, now);
        payment.set_status(change);
        payment.merge_metadata(&update.metadata, now);
        return (payment, TransitionOutcome::Recorded(update.status));
    };

    let outcome = match payment.status().decide(&update.status) {
        PaymentAction::SameStatus => TransitionOutcome::Unchanged(update.status),
        PaymentAction::Advance { old_status } => {
            payment.set_status(change);
            TransitionOutcome::Advanced {
                from: old_status,
                to: update.status,
            }
        }
        PaymentAction::LogAnomaly { current } => {
            tracing::warn!(
                payment_id = %update.payment_id,
                from = %current,
                to = %update.status,
                origin = update.origin.event_type(),
                "invalid status transition, status kept"
            );
            TransitionOutcome::Rejected {
                current,
                requested: update.status,
            }
        }
    };

    payment.merge_metadata(&update.metadata, now);
    (payment, outcome)
}
