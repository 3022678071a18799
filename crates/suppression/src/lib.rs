//! Thread suppression.
//!
//! Events generated by denylisted commands, and by every thread they spawn,
//! are dropped before reaching the consumers. The engine starts with a build
//! phase ([`SuppressionBuilder`]) where the threads already running are
//! loaded together with their lineage, then switches to the steady state
//! [`SuppressionEngine`], which follows process creation and exit events.

pub mod config;
pub mod engine;
pub mod initializer;
pub mod lineage;
pub mod tracker;

#[cfg(feature = "test-suite")]
pub mod test_suite;

pub use config::SuppressionConfig;
pub use engine::{SuppressionBuilder, SuppressionEngine, Verdict};
pub use initializer::InitError;
pub use lineage::LineageTree;
pub use tracker::{SuppressionError, SuppressionHandle, SuppressionStats, start_suppression_tracker};
