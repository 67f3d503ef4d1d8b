//!
//! Horizon integration module.
//!
//! Provides the remote ledger capability used by the sync engine and the raw record types it returns.
/// Horizon client and the `LedgerClient` trait
pub mod client;
/// Server-sent event decoding for streamed operations
pub mod sse;
/// Types for Horizon responses
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use client::*;
pub use types::*;
