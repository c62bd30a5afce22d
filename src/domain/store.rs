use {
    super::error::StoreError,
    super::id::PaymentId,
    super::lifecycle::TransitionOutcome,
    super::payment::{NewPayment, Payment, StatusUpdate},
    std::{future::Future, pin::Pin},
};

/// Durable payment records keyed by payment id.
///
/// `update_status` runs the lifecycle rules and merges metadata; it must be
/// safe to call repeatedly with the same update.
pub trait PaymentStore: Send + Sync {
    fn create(
        &self,
        payment: NewPayment,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    fn update_status(
        &self,
        update: StatusUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<TransitionOutcome, StoreError>> + Send + '_>>;

    fn get(
        &self,
        id: &PaymentId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Payment>, StoreError>> + Send + '_>>;
}
