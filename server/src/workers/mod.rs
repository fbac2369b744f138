//! Background workers

pub mod validator;
