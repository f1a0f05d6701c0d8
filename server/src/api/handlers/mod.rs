//! Request handlers.

pub mod clip;
pub mod updater;
