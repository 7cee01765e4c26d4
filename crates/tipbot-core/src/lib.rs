//! Core domain and application logic for the ETH tip bot.
//!
//! This crate is framework-agnostic. The ledger contract and the chat platforms
//! live behind ports (traits) implemented in adapter crates.

pub mod amount;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod gateway;
pub mod identity;
pub mod logging;
pub mod messaging;
pub mod notify;
pub mod pending;
pub mod router;
pub mod security;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{Error, Result};
