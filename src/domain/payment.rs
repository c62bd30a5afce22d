use {
    super::error::PaymentError,
    super::id::{EventId, PaymentId},
    super::metadata::Metadata,
    super::money::Money,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    AuthorizationRequired,
    Authorizing,
    Authorized,
    Executed,
    Settled,
    Failed,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        Self::AuthorizationRequired,
        Self::Authorizing,
        Self::Authorized,
        Self::Executed,
        Self::Settled,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationRequired => "authorization_required",
            Self::Authorizing => "authorizing",
            Self::Authorized => "authorized",
            Self::Executed => "executed",
            Self::Settled => "settled",
            Self::Failed => "failed",
        }
    }

    /// Lifecycle rank, higher means further along. `Failed` sits outside
    /// the forward chain and is handled separately by the lifecycle rules.
    pub fn rank(&self) -> u8 {
        match self {
            Self::AuthorizationRequired => 0,
            Self::Authorizing => 1,
            Self::Authorized => 2,
            Self::Executed => 3,
            Self::Settled => 4,
            Self::Failed => 5,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = PaymentError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "authorization_required" => Ok(Self::AuthorizationRequired),
            "authorizing" => Ok(Self::Authorizing),
            "authorized" => Ok(Self::Authorized),
            "executed" => Ok(Self::Executed),
            "settled" => Ok(Self::Settled),
            "failed" => Ok(Self::Failed),
            other => Err(PaymentError::validation(
                format!("unknown payment status: {other}"),
                "Unexpected payment status.",
            )),
        }
    }
}

/// One entry of a payment's append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: PaymentStatus,
    pub at: DateTime<Utc>,
    pub event_type: Option<String>,
    pub event_id: Option<String>,
}

/// What caused a status update: a webhook event, or the synchronous legs.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOrigin {
    Webhook {
        event_type: &'static str,
        event_id: Option<EventId>,
    },
    AuthorizationFlow,
    Callback,
}

impl UpdateOrigin {
    pub fn event_type(&self) -> &str {
        match self {
            Self::Webhook { event_type, .. } => event_type,
            Self::AuthorizationFlow => "authorization_flow",
            Self::Callback => "callback",
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Webhook { event_id, .. } => event_id.as_ref().map(EventId::as_str),
            _ => None,
        }
    }
}

/// Command produced by a transition rule and applied by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub metadata: Metadata,
    pub origin: UpdateOrigin,
}

/// For the initial write after the provider accepted a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: PaymentId,
    pub money: Money,
    pub status: PaymentStatus,
    pub hpp_url: Option<String>,
    pub metadata: Metadata,
}

/// Stored payment record.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    id: PaymentId,
    money: Option<Money>,
    status: PaymentStatus,
    hpp_url: Option<String>,
    metadata: Metadata,
    history: Vec<StatusChange>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn from_new(new: NewPayment, now: DateTime<Utc>) -> Self {
        Self {
            history: vec![StatusChange {
                status: new.status,
                at: now,
                event_type: Some("created".to_string()),
                event_id: None,
            }],
            id: new.id,
            money: Some(new.money),
            status: new.status,
            hpp_url: new.hpp_url,
            metadata: new.metadata.sanitized(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A record first seen through a status update, before (or without)
    /// the creation write. Amount and currency are unknown.
    pub fn placeholder(id: PaymentId, status: PaymentStatus, now: DateTime<Utc>) -> Self {
        Self {
            id,
            money: None,
            status,
            hpp_url: None,
            metadata: Metadata::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: PaymentId,
        money: Option<Money>,
        status: PaymentStatus,
        hpp_url: Option<String>,
        metadata: Metadata,
        history: Vec<StatusChange>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            money,
            status,
            hpp_url,
            metadata,
            history,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> &PaymentId {
        &self.id
    }

    pub fn money(&self) -> Option<&Money> {
        self.money.as_ref()
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn hpp_url(&self) -> Option<&str> {
        self.hpp_url.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Folds a creation write into a record that may already exist.
    /// Immutable fields are only filled when unknown; metadata from
    /// later updates wins over creation metadata.
    pub fn absorb_creation(&mut self, new: NewPayment, now: DateTime<Utc>) {
        if self.money.is_none() {
            self.money = Some(new.money);
        }
        if self.hpp_url.is_none() {
            self.hpp_url = new.hpp_url;
        }
        let mut merged = new.metadata.sanitized();
        merged.merge(&self.metadata);
        self.metadata = merged;
        self.updated_at = now;
    }

    pub(crate) fn set_status(&mut self, change: StatusChange) {
        self.status = change.status;
        self.updated_at = change.at;
        self.history.push(change);
    }

    pub(crate) fn merge_metadata(&mut self, patch: &Metadata, now: DateTime<Utc>) {
        self.metadata.merge(patch);
        self.metadata = std::mem::take(&mut self.metadata).sanitized();
        self.updated_at = now;
    }
}
