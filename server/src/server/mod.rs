//! HTTP API consumed by the UI layer

pub mod handlers;
pub mod serve;
pub mod state;
