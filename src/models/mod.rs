//! Domain records kept in the local store.

pub mod asset;
pub mod balance;
pub mod operation;
pub mod tag;

pub use asset::{InvalidAssetId, NATIVE_ASSET_ID, StellarAsset};
pub use balance::{AssetBalance, DEFAULT_BASE_RESERVE};
pub use operation::{
	AccountCreated, ChangeTrust, Operation, OperationPayload, Payment, RecordError,
};
pub use tag::{ACCOUNT_IDS_DELIMITER, Direction, Tag, TagQuery, TagType};

use serde::{Deserialize, Serialize};

/// Singleton marker recording whether the full operation history has been backfilled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSyncMeta {
	pub all_synced: bool,
}
