//! [`PaymentStore`](crate::domain::store::PaymentStore) implementations.

pub mod memory;
pub mod postgres;
