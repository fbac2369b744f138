//! Application wiring: options, state, run loop

pub mod locks;
pub mod options;
pub mod run;
pub mod state;
