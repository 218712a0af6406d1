//! leadpipe: import, deduplicate and sell lead tables
//!
//! Imports stream delimited files through a lead id assigner and in-file and
//! cross-table deduplicators into stored tables. Orders scan a collection's
//! tables with filters and a row budget, skipping leads the buyer already holds.

pub mod blob;
pub mod commands;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod ident;
pub mod import;
pub mod ledger;
pub mod meta;
pub mod progress;
pub mod reader;
pub mod table;
pub mod warning;

pub use error::{Error, Result};
