//! Tipline - SMS tip distribution daemon
//!
//! Broadcasts betting tips to a roster of punters over SMS and records each
//! punter's free-text reply as an offer acceptance, a decline, or a confirmed
//! bet. At most one bet is ever recorded per (punter, tip) pair.

pub mod config;
pub mod engine;
pub mod error;
pub mod inbound;
pub mod notify;
pub mod parser;
pub mod store;

pub use error::{Error, Result};
