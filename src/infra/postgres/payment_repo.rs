use {
    crate::domain::{
        error::StoreError,
        id::PaymentId,
        lifecycle::{self, TransitionOutcome},
        metadata::Metadata,
        money::{Currency, Money, MoneyAmount},
        payment::{NewPayment, Payment, PaymentStatus, StatusChange, StatusUpdate},
        store::PaymentStore,
    },
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Postgres, Row, Transaction},
    std::{future::Future, pin::Pin},
    uuid::Uuid,
};

/// Postgres-backed [`PaymentStore`].
///
/// Every write takes a transaction-scoped advisory lock on the payment id,
/// which serializes writers even before the row exists.
#[derive(Debug, Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_locked(&self, id: &PaymentId) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET LOCAL lock_timeout = '5s'")
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn create_payment(&self, new: NewPayment) -> Result<(), StoreError> {
        let mut tx = self.begin_locked(&new.id).await?;
        let now = Utc::now();

        let existing = load(&mut tx, &new.id).await?;
        let (payment, known_history) = match existing {
            Some(mut payment) => {
                let known = payment.history().len();
                payment.absorb_creation(new, now);
                (payment, known)
            }
            None => (Payment::from_new(new, now), 0),
        };

        save(&mut tx, &payment, known_history).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_update(&self, update: StatusUpdate) -> Result<TransitionOutcome, StoreError> {
        let mut tx = self.begin_locked(&update.payment_id).await?;

        let existing = load(&mut tx, &update.payment_id).await?;
        let known_history = existing.as_ref().map_or(0, |p| p.history().len());
        let (payment, outcome) = lifecycle::apply(existing, &update, Utc::now());

        save(&mut tx, &payment, known_history).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn find(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let payment = load(&mut tx, id).await?;
        tx.commit().await?;
        Ok(payment)
    }
}

impl PaymentStore for PgPaymentStore {
    fn create(
        &self,
        payment: NewPayment,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(self.create_payment(payment))
    }

    fn update_status(
        &self,
        update: StatusUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<TransitionOutcome, StoreError>> + Send + '_>> {
        Box::pin(self.apply_update(update))
    }

    fn get(
        &self,
        id: &PaymentId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Payment>, StoreError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move { self.find(&id).await })
    }
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{what}: {err}"))
}

async fn load(tx: &mut Transaction<'_, Postgres>, id: &PaymentId) -> Result<Option<Payment>, StoreError> {
    let Some(row) = sqlx::query(
        r#"
        SELECT payment_id, amount, currency, status, hpp_url, metadata, created_at, updated_at
        FROM payments
        WHERE payment_id = $1
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(&mut **tx)
    .await?
    else {
        return Ok(None);
    };

    let amount: Option<i64> = row.try_get("amount")?;
    let currency: Option<String> = row.try_get("currency")?;
    let money = match (amount, currency) {
        (Some(amount), Some(currency)) => Some(Money::new(
            MoneyAmount::new(amount).map_err(|e| corrupt("amount", e))?,
            Currency::try_from(currency.as_str()).map_err(|e| corrupt("currency", e))?,
        )),
        _ => None,
    };
    let status: String = row.try_get("status")?;
    let status = PaymentStatus::try_from(status.as_str()).map_err(|e| corrupt("status", e))?;
    let metadata: serde_json::Value = row.try_get("metadata")?;

    let history = sqlx::query(
        r#"
        SELECT status, event_type, event_id, changed_at
        FROM payment_status_history
        WHERE payment_id = $1
        ORDER BY changed_at, id
        "#,
    )
    .bind(id.as_str())
    .fetch_all(&mut **tx)
    .await?
    .into_iter()
    .map(|r| -> Result<StatusChange, StoreError> {
        let status: String = r.try_get("status")?;
        Ok(StatusChange {
            status: PaymentStatus::try_from(status.as_str()).map_err(|e| corrupt("history status", e))?,
            at: r.try_get("changed_at")?,
            event_type: r.try_get("event_type")?,
            event_id: r.try_get("event_id")?,
        })
    })
    .collect::<Result<Vec<_>, StoreError>>()?;

    let payment_id: String = row.try_get("payment_id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Some(Payment::restore(
        PaymentId::new(payment_id).map_err(|e| corrupt("payment_id", e))?,
        money,
        status,
        row.try_get("hpp_url")?,
        Metadata::from_value(metadata),
        history,
        created_at,
        updated_at,
    )))
}

/// Upserts the row and appends history entries past `known_history`.
async fn save(tx: &mut Transaction<'_, Postgres>, payment: &Payment, known_history: usize) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO payments
            (payment_id, amount, currency, status, hpp_url, metadata, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (payment_id) DO UPDATE SET
            amount     = EXCLUDED.amount,
            currency   = EXCLUDED.currency,
            status     = EXCLUDED.status,
            hpp_url    = EXCLUDED.hpp_url,
            metadata   = EXCLUDED.metadata,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(payment.id().as_str())
    .bind(payment.money().map(|m| m.amount().minor()))
    .bind(payment.money().map(|m| m.currency().as_str()))
    .bind(payment.status().as_str())
    .bind(payment.hpp_url())
    .bind(payment.metadata().to_value())
    .bind(payment.created_at())
    .bind(payment.updated_at())
    .execute(&mut **tx)
    .await?;

    for change in payment.history().iter().skip(known_history) {
        sqlx::query(
            r#"
            INSERT INTO payment_status_history (id, payment_id, status, event_type, event_id, changed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(payment.id().as_str())
        .bind(change.status.as_str())
        .bind(change.event_type.as_deref())
        .bind(change.event_id.as_deref())
        .bind(change.at)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
