//! Local mirror of a single Stellar account.
//!
//! The crate keeps a SQLite copy of an account's balances and operation history in sync with
//! a Horizon server:
//!
//! - [`horizon`]: the remote ledger client and raw record types
//! - [`models`]: assets, balances, normalized operations and their tags
//! - [`storage`]: the local store and the tag index query engine
//! - [`kit`]: configuration, the synchronizers, the update listener and the [`StellarKit`] handle

pub mod horizon;
pub mod kit;
pub mod models;
pub mod storage;

pub use kit::{KitConfig, KitError, Network, StellarKit, SyncError, SyncState};
pub use models::{AssetBalance, Direction, Operation, StellarAsset, TagQuery, TagType};
pub use storage::OperationQuery;
