pub mod api_errors;
pub mod handlers;
pub mod http;
pub mod truelayer;
