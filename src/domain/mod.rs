pub mod error;
pub mod id;
pub mod lifecycle;
pub mod metadata;
pub mod money;
pub mod payment;
pub mod provider;
pub mod store;
pub mod taxonomy;
pub mod webhook;
