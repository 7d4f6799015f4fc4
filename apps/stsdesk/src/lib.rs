//! # stsdesk
//!
//! HTTP server and CLI over the `stsdesk-core` ledger.
//!
//! The binary in `main.rs` only sets up logging and hands the parsed
//! command line to [`cli::execute`]; everything else lives here so the
//! integration tests can drive the router directly.

pub mod api;
pub mod cli;
pub mod config;
