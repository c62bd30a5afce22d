mod common;

use bankpay::domain::id::{EventId, PaymentId};
use bankpay::domain::lifecycle::TransitionOutcome;
use bankpay::domain::metadata::Metadata;
use bankpay::domain::money::{Currency, Money, MoneyAmount};
use bankpay::domain::payment::{NewPayment, PaymentStatus, StatusUpdate, UpdateOrigin};
use bankpay::domain::store::PaymentStore;
use bankpay::infra::postgres::PgPaymentStore;
use common::*;
use serde_json::json;

const DB: &str = "bankpay_test_payment_repo";

fn new_payment(id: &str) -> NewPayment {
    let mut metadata = Metadata::new();
    metadata.set("orderId", format!("order-{id}"));
    NewPayment {
        id: PaymentId::new(id).unwrap(),
        money: Money::new(MoneyAmount::new(10_000).unwrap(), Currency::Eur),
        status: PaymentStatus::AuthorizationRequired,
        hpp_url: Some(format!("https://hpp.example/{id}")),
        metadata,
    }
}

fn webhook_update(id: &str, status: PaymentStatus, event_id: &str) -> StatusUpdate {
    let mut metadata = Metadata::new();
    metadata.set("lastWebhookEventId", event_id);
    StatusUpdate {
        payment_id: PaymentId::new(id).unwrap(),
        status,
        metadata,
        origin: UpdateOrigin::Webhook {
            event_type: "payment_executed",
            event_id: Some(EventId::new(event_id).unwrap()),
        },
    }
}

// ── 1. create_then_read_back ───────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires a running postgres"]
async fn create_then_read_back() {
    let store = PgPaymentStore::new(setup_pool(DB).await);

    store.create(new_payment("pay_rb")).await.unwrap();
    let payment = store.get(&PaymentId::new("pay_rb").unwrap()).await.unwrap().unwrap();

    assert_eq!(payment.status(), PaymentStatus::AuthorizationRequired);
    assert_eq!(payment.money().unwrap().amount().minor(), 10_000);
    assert_eq!(payment.money().unwrap().currency(), Currency::Eur);
    assert_eq!(payment.hpp_url(), Some("https://hpp.example/pay_rb"));
    assert_eq!(payment.metadata().get("orderId"), Some(&json!("order-pay_rb")));
    assert_eq!(payment.history().len(), 1);
}

// ── 2. advance_appends_history ─────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires a running postgres"]
async fn advance_appends_history() {
    let pool = setup_pool(DB).await;
    let store = PgPaymentStore::new(pool.clone());
    store.create(new_payment("pay_adv")).await.unwrap();

    let outcome = store
        .update_status(webhook_update("pay_adv", PaymentStatus::Executed, "evt_adv_1"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        TransitionOutcome::Advanced {
            from: PaymentStatus::AuthorizationRequired,
            to: PaymentStatus::Executed
        }
    );
    let payment = store.get(&PaymentId::new("pay_adv").unwrap()).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Executed);
    assert_eq!(payment.history()[1].event_id.as_deref(), Some("evt_adv_1"));
    assert_eq!(payment.history()[1].event_type.as_deref(), Some("payment_executed"));
    assert_eq!(count_history(&pool, "pay_adv").await, 2);
}

// ── 3. regression_is_rejected_but_metadata_merged ──────────────────────────

#[tokio::test]
#[ignore = "requires a running postgres"]
async fn regression_is_rejected_but_metadata_merged() {
    let pool = setup_pool(DB).await;
    let store = PgPaymentStore::new(pool.clone());
    store.create(new_payment("pay_reg")).await.unwrap();
    store
        .update_status(webhook_update("pay_reg", PaymentStatus::Settled, "evt_reg_1"))
        .await
        .unwrap();

    let outcome = store
        .update_status(webhook_update("pay_reg", PaymentStatus::Executed, "evt_reg_2"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        TransitionOutcome::Rejected {
            current: PaymentStatus::Settled,
            requested: PaymentStatus::Executed
        }
    );
    let payment = store.get(&PaymentId::new("pay_reg").unwrap()).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Settled);
    assert_eq!(payment.metadata().get("lastWebhookEventId"), Some(&json!("evt_reg_2")));
    assert_eq!(count_history(&pool, "pay_reg").await, 2);
}

// ── 4. update_before_create_is_absorbed ────────────────────────────────────

#[tokio::test]
#[ignore = "requires a running postgres"]
async fn update_before_create_is_absorbed() {
    let store = PgPaymentStore::new(setup_pool(DB).await);

    let outcome = store
        .update_status(webhook_update("pay_early", PaymentStatus::Executed, "evt_early"))
        .await
        .unwrap();
    assert_eq!(outcome, TransitionOutcome::Recorded(PaymentStatus::Executed));

    store.create(new_payment("pay_early")).await.unwrap();

    let payment = store.get(&PaymentId::new("pay_early").unwrap()).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Executed);
    assert!(payment.money().is_some());
    assert_eq!(payment.hpp_url(), Some("https://hpp.example/pay_early"));
}

// ── 5. unknown_payment_is_none ─────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires a running postgres"]
async fn unknown_payment_is_none() {
    let store = PgPaymentStore::new(setup_pool(DB).await);
    assert!(store.get(&PaymentId::new("pay_missing").unwrap()).await.unwrap().is_none());
}

// ── 6. concurrent_updates_serialize ────────────────────────────────────────
// Many writers race forward updates on one payment. The advisory lock
// serializes them, so history stays strictly increasing.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a running postgres"]
async fn concurrent_updates_serialize() {
    let pool = setup_pool(DB).await;
    let store = std::sync::Arc::new(PgPaymentStore::new(pool.clone()));
    store.create(new_payment("pay_conc")).await.unwrap();

    let statuses = [
        PaymentStatus::Authorizing,
        PaymentStatus::Authorized,
        PaymentStatus::Executed,
        PaymentStatus::Settled,
    ];
    let mut handles = Vec::new();
    for i in 0..5 {
        for status in statuses {
            let store = store.clone();
            let event_id = format!("evt_conc_{i}_{}", status.as_str());
            handles.push(tokio::spawn(async move {
                store
                    .update_status(webhook_update("pay_conc", status, &event_id))
                    .await
                    .unwrap()
            }));
        }
    }

    let mut advanced = 0;
    for h in handles {
        if let TransitionOutcome::Advanced { .. } = h.await.unwrap() {
            advanced += 1;
        }
    }

    let payment = store.get(&PaymentId::new("pay_conc").unwrap()).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Settled);
    let ranks: Vec<u8> = payment.history().iter().map(|c| c.status.rank()).collect();
    assert!(ranks.windows(2).all(|w| w[0] < w[1]), "history regressed: {ranks:?}");
    assert_eq!(count_history(&pool, "pay_conc").await as usize, advanced + 1);
}
