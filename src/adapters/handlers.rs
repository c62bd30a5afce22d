use {
    super::api_errors::{ApiError, WebhookRejection},
    crate::{
        AppState,
        domain::{error::PaymentError, id::PaymentId, payment::Payment, provider::FetchedPayment},
        services::{
            dispatcher::{DispatchOutcome, DropReason},
            payments::CreatePaymentInput,
        },
    },
    axum::{
        Json,
        body::Bytes,
        extract::{OriginalUri, Path, Query, State},
        http::{HeaderMap, Method, StatusCode, header},
        response::{IntoResponse, Redirect, Response},
    },
    serde::Deserialize,
    serde_json::{Value, json},
    url::Url,
};

pub const SIGNATURE_HEADER: &str = "tl-signature";

#[tracing::instrument(skip_all)]
pub async fn create_payment_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let input: CreatePaymentInput = serde_json::from_slice(&body).map_err(|e| {
        PaymentError::validation(
            format!("invalid request body: {e}"),
            "Invalid payment request.",
        )
    })?;

    let created = state.payments.create_payment(input).await?;
    tracing::info!(payment_id = %created.payment_id, "payment created");

    Ok(Json(json!({
        "success": true,
        "paymentId": created.payment_id,
        "hppUrl": created.hpp_url,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub payment_id: Option<String>,
}

/// Browser return leg. Always answers with a redirect to the results page
/// unless the request itself is unusable.
#[tracing::instrument(skip_all)]
pub async fn payment_callback_handler(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if method != Method::GET {
        return method_not_allowed(Method::GET);
    }

    let Some(payment_id) = query.payment_id.and_then(|raw| PaymentId::new(raw).ok()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing 'payment_id' parameter." })),
        )
            .into_response();
    };

    let target = match state.payments.handle_callback(&payment_id).await {
        Ok(fetched) => result_redirect(&state.frontend_url, &fetched),
        Err(err) => {
            tracing::error!(%payment_id, code = %err.code(), "callback failed: {err}");
            error_redirect(&state.frontend_url, &err, Some(&payment_id))
        }
    };

    match target {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(e) => {
            tracing::error!(frontend_url = %state.frontend_url, "cannot build redirect: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Invalid results page URL." })),
            )
                .into_response()
        }
    }
}

#[tracing::instrument(skip_all)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookRejection> {
    if method != Method::POST {
        return Ok(method_not_allowed(Method::POST));
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());

    let outcome = state
        .webhooks
        .dispatch(signature, &body, path, &headers)
        .await?;

    match &outcome {
        DispatchOutcome::Applied {
            payment_id,
            event_type,
            outcome,
        } => tracing::info!(%payment_id, event_type, ?outcome, "webhook applied"),
        DispatchOutcome::Dropped(DropReason::UnknownEventType(kind)) => {
            tracing::info!(event_type = %kind, "unhandled webhook type")
        }
        DispatchOutcome::Dropped(reason) => tracing::warn!(?reason, "webhook dropped"),
    }

    Ok(Json(json!({ "received": true })).into_response())
}

#[tracing::instrument(skip(state))]
pub async fn get_payment_handler(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    let payment_id = PaymentId::new(payment_id)?;
    Ok(Json(state.payments.get_payment(&payment_id).await?))
}

fn method_not_allowed(allowed: Method) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, allowed.as_str().to_string())],
        Json(json!({ "error": "Method not allowed." })),
    )
        .into_response()
}

/// `<frontend>?payment_id=..&status=..&amount=..&currency=..`
pub fn result_redirect(frontend: &str, fetched: &FetchedPayment) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(frontend)?;
    url.query_pairs_mut()
        .append_pair("payment_id", fetched.id.as_str())
        .append_pair("status", fetched.status.as_str())
        .append_pair("amount", &fetched.amount_in_minor.to_string())
        .append_pair("currency", &fetched.currency);
    Ok(url)
}

/// `<frontend>/payment-result.html?error=..&error_code=..[&payment_id=..]`
pub fn error_redirect(
    frontend: &str,
    err: &PaymentError,
    payment_id: Option<&PaymentId>,
) -> Result<Url, url::ParseError> {
    let base = frontend.split(['?', '#']).next().unwrap_or(frontend);
    let mut url = Url::parse(&format!("{}/payment-result.html", base.trim_end_matches('/')))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("error", err.user_message())
            .append_pair("error_code", err.code().as_str());
        if let Some(id) = payment_id {
            pairs.append_pair("payment_id", id.as_str());
        }
    }
    Ok(url)
}
