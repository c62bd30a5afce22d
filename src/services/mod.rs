pub mod dispatcher;
pub mod payments;
pub mod retry;
