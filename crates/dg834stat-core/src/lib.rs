//! dg834stat-core — line statistics collection for Netgear DG834 routers.
//!
//! Provides:
//! - `collector` — telnet/HTTP access to the router and text extraction
//! - `storage` — the `Sample` model and its JSON/CSV sinks
//! - `daemon` — the poll loop and its shutdown flag
//! - `config` — daemon settings and defaults

pub mod collector;
pub mod config;
pub mod daemon;
pub mod storage;
