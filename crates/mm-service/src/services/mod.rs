//! Business logic layer.
//!
//! - `matchmaker` - session relay façade composing the store, the device
//!   registry, code generation and event publishing
//! - `gatekeeper` - free-mode admission control with per-fingerprint
//!   cooldown

pub mod gatekeeper;
pub mod matchmaker;

pub use gatekeeper::{Gatekeeper, GateDecision};
pub use matchmaker::{Matchmaker, RegisterInput, Registration};
