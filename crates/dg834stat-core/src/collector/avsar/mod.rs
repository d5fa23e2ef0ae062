//! The TI AR7 "avalanche" SAR statistics report.
//!
//! DG834 routers expose line statistics at
//! `/proc/avalanche/avsar_modem_stats`; this module turns that text into a
//! [`Sample`](crate::storage::Sample).

pub mod parser;

pub use parser::{FieldPatternSet, PatternError, extract};

/// Path of the statistics pseudo-file on the router.
pub const STATS_PATH: &str = "/proc/avalanche/avsar_modem_stats";
