//! Synchronization engine.
//!
//! Two independent synchronizers mirror remote state into the [`KitStore`](crate::storage::KitStore):
//!
//! - [`BalanceSynchronizer`] replaces the whole balance set from the account document.
//! - [`OperationSynchronizer`] appends new operations page by page and backfills older ones on
//!   demand.
//!
//! Each owns a [`SyncState`] published through a `watch` channel. A sync only starts when the
//! state is not already `Syncing`; overlapping calls return the current state without touching
//! the remote service. The [`UpdateListener`] feeds the change signal from [`events`] that the
//! coordinator in [`crate::kit::StellarKit`] reacts to.

pub mod balances;
pub mod events;
pub mod listener;
pub mod operations;
pub mod progress_tracker;

pub use balances::BalanceSynchronizer;
pub use events::{ChangeNotifier, ChangeReceiver, UpdateEvent, change_channel};
pub use listener::UpdateListener;
pub use operations::{BackfillOutcome, OperationSynchronizer};
pub use progress_tracker::{SyncDirection, SyncProgressTracker, SyncStats};

use super::types::{SyncError, SyncState};
use tokio::sync::watch;

/// Marks one running sync on a state channel.
///
/// Dropping the guard without [`SyncGuard::finish`] (the sync future was cancelled) moves the
/// state to `NotSynced(Cancelled)` so the synchronizer does not stay `Syncing` forever.
pub(crate) struct SyncGuard<'a> {
	state: &'a watch::Sender<SyncState>,
	finished: bool,
}

impl<'a> SyncGuard<'a> {
	/// Switch to `Syncing` unless a sync is already running.
	pub(crate) fn try_begin(state: &'a watch::Sender<SyncState>) -> Option<Self> {
		let started = state.send_if_modified(|current| {
			if current.is_syncing() {
				false
			} else {
				*current = SyncState::Syncing;
				true
			}
		});

		if !started {
			return None;
		}
		Some(Self {
			state,
			finished: false,
		})
	}

	pub(crate) fn finish(mut self, outcome: SyncState) -> SyncState {
		self.finished = true;
		self.state.send_replace(outcome.clone());
		outcome
	}
}

impl Drop for SyncGuard<'_> {
	fn drop(&mut self) {
		if !self.finished {
			self.state
				.send_replace(SyncState::NotSynced(SyncError::Cancelled));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_guard_rejects_overlap() {
		let (state, _rx) = watch::channel(SyncState::default());

		let guard = SyncGuard::try_begin(&state).unwrap();
		assert!(state.borrow().is_syncing());
		assert!(SyncGuard::try_begin(&state).is_none());
		// the rejected call leaves the running sync alone
		assert_eq!(*state.borrow(), SyncState::Syncing);
		assert!(SyncGuard::try_begin(&state).is_none());

		assert_eq!(guard.finish(SyncState::Synced), SyncState::Synced);
		assert!(SyncGuard::try_begin(&state).is_some());
	}

	#[test]
	fn test_dropped_guard_reports_cancellation() {
		let (state, _rx) = watch::channel(SyncState::default());

		drop(SyncGuard::try_begin(&state));
		assert_eq!(
			*state.borrow(),
			SyncState::NotSynced(SyncError::Cancelled)
		);
	}
}
