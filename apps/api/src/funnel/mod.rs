pub mod handlers;
pub mod metrics;
pub mod store;
pub mod triggers;
