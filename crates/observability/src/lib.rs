//! Process-wide tracing setup.
//!
//! The engine crates only emit `tracing` events; installing a subscriber is
//! the job of whatever process hosts them, once, at start-up.

pub mod tracing;

pub use crate::tracing::{LogConfig, LogFormat};

/// Install the subscriber described by the environment.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init() {
    crate::tracing::init_with(&LogConfig::from_env());
}
