//! Session matchmaker and device registry.
//!
//! Pairs screen-sharing hosts with viewers through short human-typeable
//! access codes: hosts publish a WebRTC offer under a code, viewers resolve
//! the code, and the answer flows back the same way. Fixed codes are bound
//! to an account's device and persist across restarts; dynamic codes live
//! for one handshake cycle. A free-mode gate limits unpaid usage per
//! hardware fingerprint.

pub mod codes;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod store;
pub mod tasks;
