//! Dockhand Library
//!
//! Core modules for the dockhand deployment server.

pub mod app;
pub mod deploy;
pub mod docker;
pub mod errors;
pub mod ingress;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
