//! I/O helpers for the enrichment engine.

pub mod audit_log;
pub mod cancel;
pub mod config;
pub mod process;
pub mod prompt;
pub mod table_store;
pub mod tool;
pub mod wait;
