pub mod form;
pub mod handlers;
pub mod prompts;
pub mod service;
pub mod store;
