//! syscap carries syscall events from a capture producer to its consumers.
//!
//! The workspace is split in three crates, re-exported here:
//!
//! - [`capture_common`]: the wire format shared by both sides, with the
//!   record decoder, the event schemas and the configuration layer
//! - [`event_encoder`]: the producer side, serializing syscall arguments into
//!   records with size limits and a dynamic snaplen for socket payloads
//! - [`suppression`]: the engine dropping the events of denylisted commands
//!   and of all their descendants
//!
//! The [`pipeline`] glues the consumer side together, and the `syscap-replay`
//! binary runs it on a capture file:
//!
//! ```sh
//! syscap-replay --suppress-comm sshd --scan-procfs capture.bin
//! ```

pub mod cli;
pub mod pipeline;
pub mod replay;

pub use capture_common;
pub use event_encoder;
pub use suppression;

pub mod metadata {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Init logger. We log from info level and above, hide timestamp
/// and module path.
/// If RUST_LOG is set, we assume the user wants to debug something
/// and use env_logger default behaviour.
pub fn init_logger(override_log_level: Option<log::LevelFilter>) {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::init();
    } else {
        let level_filter = override_log_level.unwrap_or(log::LevelFilter::Info);

        env_logger::builder()
            .filter_level(level_filter)
            .format_timestamp(None)
            .format_module_path(false)
            .init();
    }
}
