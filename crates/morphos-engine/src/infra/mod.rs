//! Persistence: platform state store and append-only operator logs
pub mod operator_log;
pub mod state_store;
