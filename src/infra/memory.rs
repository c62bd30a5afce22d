use {
    crate::domain::{
        error::StoreError,
        id::PaymentId,
        lifecycle::{self, TransitionOutcome},
        payment::{NewPayment, Payment, StatusUpdate},
        store::PaymentStore,
    },
    chrono::Utc,
    std::{
        collections::HashMap,
        future::Future,
        pin::Pin,
        sync::{
            Mutex, PoisonError,
            atomic::{AtomicUsize, Ordering},
        },
    },
};

/// Process-local store. Used when no database is configured, and in tests.
///
/// The map lock is held for the whole read-modify-write, so concurrent
/// updates to one payment are serialized.
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    payments: Mutex<HashMap<PaymentId, Payment>>,
    updates: AtomicUsize,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.payments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `update_status` calls served.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn create_sync(&self, new: NewPayment) {
        let now = Utc::now();
        let mut payments = self.payments.lock().unwrap_or_else(PoisonError::into_inner);
        match payments.get_mut(&new.id) {
            Some(existing) => existing.absorb_creation(new, now),
            None => {
                payments.insert(new.id.clone(), Payment::from_new(new, now));
            }
        }
    }

    fn update_sync(&self, update: &StatusUpdate) -> TransitionOutcome {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut payments = self.payments.lock().unwrap_or_else(PoisonError::into_inner);
        let current = payments.remove(&update.payment_id);
        let (payment, outcome) = lifecycle::apply(current, update, Utc::now());
        payments.insert(update.payment_id.clone(), payment);
        outcome
    }
}

impl PaymentStore for InMemoryPaymentStore {
    fn create(
        &self,
        payment: NewPayment,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        self.create_sync(payment);
        Box::pin(async { Ok(()) })
    }

    fn update_status(
        &self,
        update: StatusUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<TransitionOutcome, StoreError>> + Send + '_>> {
        let outcome = self.update_sync(&update);
        Box::pin(async move { Ok(outcome) })
    }

    fn get(
        &self,
        id: &PaymentId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Payment>, StoreError>> + Send + '_>> {
        let found = self
            .payments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        Box::pin(async move { Ok(found) })
    }
}
