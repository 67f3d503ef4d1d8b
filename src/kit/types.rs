use crate::horizon::HorizonError;
use crate::storage::StorageError;

use serde::{Deserialize, Serialize};

/// Cause carried by [`SyncState::NotSynced`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum SyncError {
	#[error("Not started")]
	NotStarted,

	#[error("Remote error: {0}")]
	Remote(String),

	#[error("Storage error: {0}")]
	Storage(String),

	#[error("Malformed remote data: {0}")]
	Malformed(String),

	/// The sync future was dropped before it finished.
	#[error("Sync cancelled")]
	Cancelled,
}

impl From<HorizonError> for SyncError {
	fn from(e: HorizonError) -> Self {
		SyncError::Remote(e.to_string())
	}
}

impl From<StorageError> for SyncError {
	fn from(e: StorageError) -> Self {
		SyncError::Storage(e.to_string())
	}
}

/// Observable state of one synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
	NotSynced(SyncError),
	Syncing,
	Synced,
}

impl Default for SyncState {
	fn default() -> Self {
		SyncState::NotSynced(SyncError::NotStarted)
	}
}

impl SyncState {
	pub fn is_syncing(&self) -> bool {
		matches!(self, SyncState::Syncing)
	}

	pub fn is_synced(&self) -> bool {
		matches!(self, SyncState::Synced)
	}
}

/// Errors surfaced to consumers of the kit
#[derive(Debug, thiserror::Error)]
pub enum KitError {
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("Remote error: {0}")]
	Remote(#[from] HorizonError),

	#[error("Insufficient balance")]
	InsufficientBalance,

	#[error("Sync error: {0}")]
	Sync(#[from] SyncError),

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}
