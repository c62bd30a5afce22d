//! Provider adapter: OAuth client-credentials, signed payment calls and
//! webhook signature verification.

pub mod client;
pub mod signing;
pub mod types;

pub use client::{ALLOWED_JKUS, ProviderSettings, TrueLayerClient};
pub use signing::RequestSigner;
