//! honeyscope library interface
//!
//! Exposes the event exploration pipeline for use by binaries and tests.

pub mod config;
pub mod console;
pub mod distribution;
pub mod export;
pub mod filter;
pub mod geo;
pub mod models;
pub mod schema;
pub mod sync;
pub mod utils;
