//! Account mirror: configuration, sync engine and the [`StellarKit`] handle.

pub mod config;
#[allow(clippy::module_inception)]
pub mod kit;
pub mod sync;
pub mod types;

pub use config::{KitConfig, MAX_PAGE_SIZE, Network, ReconnectConfig};
pub use kit::{SEND_FEE, StellarKit};
pub use sync::BackfillOutcome;
pub use types::{KitError, SyncError, SyncState};
