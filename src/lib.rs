//! Arbiter: wallet session and moderation client.
//!
//! The wallet side tracks a single wallet's connection state (address,
//! chain, provider availability) through an event-driven session, switches
//! the wallet onto the arbitration network, and remembers an explicit logout
//! across restarts. On top of it, the moderation side files incident reports
//! and triggers arbitration on the ledger contract.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod contract;
pub mod error;
pub mod format;
pub mod jsonrpc;
pub mod moderation;
pub mod notice;
pub mod storage;
pub mod wallet;

pub use config::Config;
pub use error::{Error, Result};
