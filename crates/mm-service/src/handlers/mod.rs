//! HTTP handlers.

pub mod codes;
pub mod devices;
pub mod free_mode;
pub mod health;
pub mod sessions;
