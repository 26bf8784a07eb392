//! Process-wide tracing setup for the piggy bank.

pub mod subscriber;

pub use subscriber::{LogFormat, init, init_with};
