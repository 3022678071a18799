//! Definitions shared by the producer and the consumer side of the capture
//! pipeline: the record wire format, the parameter type table, the event
//! schemas and the configuration layer.

pub mod config;
pub mod consts;
pub mod parsing;
pub mod settings;
#[cfg(feature = "test-utils")]
pub mod test_runner;
pub mod time;

mod tid;

pub use config::{ConfigError, ConfigMap};
pub use settings::CaptureSettings;
pub use tid::Tid;

/// Utility function to pretty print an error with its sources.
///
/// We use this because by default Rust won't print the source of an error message,
/// making it much less useful. Instead of re-implementing that, we'll just use
/// anyhow as an error pretty-printer.
pub fn log_error<E: std::error::Error + Send + Sync + 'static>(msg: &str, err: E) {
    log::error!("{}: {:?}", msg, anyhow::Error::from(err));
}
