//! Access to the router's line statistics.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                ModemClient (trait)            │
//! └───────────────┬───────────────────┬───────────┘
//!                 │                   │
//!          ┌──────▼──────┐     ┌──────▼──────┐
//!          │ Dg834Client │     │  MockModem  │
//!          │  (network)  │     │  (testing)  │
//!          └──┬───────┬──┘     └─────────────┘
//!             │       │
//!      ┌──────▼──┐ ┌──▼────────────┐
//!      │  setup  │ │ TelnetSession │
//!      │ (HTTP)  │ │   (port 23)   │
//!      └─────────┘ └───────────────┘
//! ```
//!
//! The text returned by [`ModemClient::collect`] is turned into a
//! [`Sample`](crate::storage::Sample) by [`avsar::extract`].
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use dg834stat_core::collector::{FieldPatternSet, MockModem, ModemClient, extract};
//!
//! let modem = MockModem::typical_dg834();
//! let text = modem.collect("192.168.0.1", Duration::from_secs(10)).unwrap();
//! let sample = extract(&text, &FieldPatternSet::dg834());
//! assert_eq!(sample.ds_conn_rate, Some(8128));
//! ```

pub mod avsar;
mod client;
pub mod mock;
pub mod setup;
pub mod telnet;
pub mod traits;

pub use avsar::{FieldPatternSet, PatternError, extract};
pub use client::Dg834Client;
pub use mock::MockModem;
pub use traits::{CollectError, ModemClient};
