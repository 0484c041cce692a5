//! Background tasks.

pub mod sweeper;

pub use sweeper::{start_offline_sweeper, start_session_sweeper};
