//! Domain models

pub mod ingress;
pub mod project;
pub mod service;
