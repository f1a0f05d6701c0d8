//! HTTP front end for the metbox clip store.

pub mod api;
pub mod config;
pub mod error;
pub mod scheduler;
