//! Persistent state: datastore, settings, layout, attempt logs

pub mod build_logs;
pub mod layout;
pub mod settings;
pub mod store;
