//! Wire types of the provider's payments API.

use {
    crate::domain::{
        error::{ErrorCode, PaymentError},
        metadata::Metadata,
    },
    serde::{Deserialize, Serialize},
};

pub const SCHEME_ID: &str = "sepa_credit_transfer";
pub const DEMO_USER_NAME: &str = "Demo User";
pub const DEMO_USER_EMAIL: &str = "demo-user@anapay.com";
pub const DEMO_USER_PHONE: &str = "+448081648350";

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentBody<'a> {
    pub amount_in_minor: i64,
    pub currency: &'a str,
    pub payment_method: PaymentMethod<'a>,
    pub user: PaymentUser<'a>,
    pub metadata: &'a Metadata,
}

#[derive(Debug, Serialize)]
pub struct PaymentMethod<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub provider_selection: ProviderSelection<'a>,
    pub beneficiary: Beneficiary<'a>,
}

#[derive(Debug, Serialize)]
pub struct ProviderSelection<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub provider_id: &'a str,
    pub scheme_selection: SchemeSelection,
}

#[derive(Debug, Serialize)]
pub struct SchemeSelection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub scheme_id: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Beneficiary<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub merchant_account_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct PaymentUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
}

impl<'a> CreatePaymentBody<'a> {
    pub fn bank_transfer(
        amount_in_minor: i64,
        currency: &'a str,
        provider_id: &'a str,
        merchant_account_id: &'a str,
        metadata: &'a Metadata,
    ) -> Self {
        Self {
            amount_in_minor,
            currency,
            payment_method: PaymentMethod {
                kind: "bank_transfer",
                provider_selection: ProviderSelection {
                    kind: "preselected",
                    provider_id,
                    scheme_selection: SchemeSelection {
                        kind: "preselected",
                        scheme_id: SCHEME_ID,
                    },
                },
                beneficiary: Beneficiary {
                    kind: "merchant_account",
                    merchant_account_id,
                },
            },
            user: PaymentUser {
                name: DEMO_USER_NAME,
                email: DEMO_USER_EMAIL,
                phone: DEMO_USER_PHONE,
            },
            metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub resource_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizationFlowBody<'a> {
    pub redirect: RedirectBody<'a>,
}

#[derive(Debug, Serialize)]
pub struct RedirectBody<'a> {
    pub return_uri: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizationFlowResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub authorization_flow: Option<FlowDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FlowDetails {
    #[serde(default)]
    pub actions: Option<FlowActions>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FlowActions {
    #[serde(default)]
    pub next: Option<NextAction>,
}

#[derive(Debug, Deserialize)]
pub struct NextAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub uri: Option<String>,
}

impl AuthorizationFlowResponse {
    pub fn next_action(&self) -> Option<&NextAction> {
        self.authorization_flow.as_ref()?.actions.as_ref()?.next.as_ref()
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusResponse {
    pub id: String,
    pub status: String,
    pub amount_in_minor: i64,
    pub currency: String,
}

/// Error body; the provider uses both problem-details and `errors[]` shapes.
#[derive(Debug, Default, Deserialize)]
pub struct ProviderErrorBody {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub errors: Vec<ProviderErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderErrorItem {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ProviderErrorBody {
    /// Lenient: anything that is not a JSON object yields an empty body.
    pub fn parse(raw: &[u8]) -> Self {
        serde_json::from_slice(raw).unwrap_or_default()
    }

    pub fn error_type(&self) -> Option<&str> {
        self.kind
            .as_deref()
            .or_else(|| self.errors.first().and_then(|e| e.kind.as_deref()))
    }

    pub fn message(&self) -> Option<&str> {
        self.errors
            .first()
            .and_then(|e| e.error_description.as_deref())
            .or(self.detail.as_deref())
            .or(self.title.as_deref())
    }
}

/// Decodes a 2xx body, treating undecodable content as a provider fault.
pub fn decode<T: serde::de::DeserializeOwned>(body: &[u8], what: &str) -> Result<T, PaymentError> {
    serde_json::from_slice(body).map_err(|e| {
        PaymentError::new(
            ErrorCode::UnknownError,
            format!("unexpected {what} response from provider: {e}"),
        )
        .with_http_status(502)
        .with_retryable(true)
        .with_source(e)
    })
}
