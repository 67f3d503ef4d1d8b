//! Operation synchronizer.
//!
//! Forward sync walks the remote history upwards from the paging token of the newest stored
//! operation. Each page is normalized into [`Operation`]s and their [`Tag`](crate::models::Tag)s
//! and committed as one store transaction, so a failure mid-run keeps every page committed so
//! far and the next run resumes right after it.
//!
//! Backfill walks downwards from the oldest stored operation, one page per request, and marks
//! the history complete once the remote service returns a short page.
//!
//! Records that cannot be normalized, or whose id would break the id ordering of the run, are
//! skipped and logged; the rest of the page is still stored.

use super::SyncGuard;
use super::progress_tracker::{SyncDirection, SyncProgressTracker};
use crate::horizon::{LedgerClient, OperationRecord};
use crate::kit::types::{SyncError, SyncState};
use crate::models::{Operation, OperationSyncMeta};
use crate::storage::{KitStore, OperationBatch};

use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// Result of one backfill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
	/// The full history was already stored; nothing was fetched.
	AlreadySynced,
	/// Another backfill request is still running.
	InProgress,
	Fetched { inserted: usize, all_synced: bool },
}

pub struct OperationSynchronizer {
	client: Arc<dyn LedgerClient>,
	store: Arc<KitStore>,
	account_id: String,
	page_size: usize,
	state: watch::Sender<SyncState>,
	/// Bumped after every run that stored at least one new operation.
	changes: watch::Sender<u64>,
	backfill: Mutex<()>,
}

impl OperationSynchronizer {
	pub fn new(
		client: Arc<dyn LedgerClient>,
		store: Arc<KitStore>,
		account_id: impl Into<String>,
		page_size: usize,
	) -> Self {
		let (state, _) = watch::channel(SyncState::default());
		let (changes, _) = watch::channel(0);
		Self {
			client,
			store,
			account_id: account_id.into(),
			page_size: page_size.max(1),
			state,
			changes,
			backfill: Mutex::new(()),
		}
	}

	pub fn sync_state(&self) -> SyncState {
		self.state.borrow().clone()
	}

	pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
		self.state.subscribe()
	}

	/// Counter of runs that stored new operations.
	pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
		self.changes.subscribe()
	}

	/// Fetch and store every operation newer than the newest stored one.
	pub async fn sync(&self) -> SyncState {
		self.run(false).await
	}

	/// Sync the whole history again from the beginning.
	///
	/// The stored history, its tags and the backfill marker are replaced in the same transaction
	/// as the first fetched page; a failure before that leaves them untouched.
	pub async fn resync(&self) -> SyncState {
		self.run(true).await
	}

	async fn run(&self, clear: bool) -> SyncState {
		let Some(guard) = SyncGuard::try_begin(&self.state) else {
			debug!("Operation sync already in progress, skipping");
			return self.sync_state();
		};

		// replaced once the stored cursor is known
		let mut tracker = SyncProgressTracker::new(SyncDirection::Forward, None);
		let result = self.sync_forward(clear, &mut tracker).await;
		let stats = tracker.get_stats();

		if stats.inserted > 0 || (clear && result.is_ok()) {
			self.changes.send_modify(|count| *count += 1);
		}

		let outcome = match result {
			Ok(()) => {
				info!("{}", stats.summary());
				SyncState::Synced
			}
			Err(e) => {
				warn!("Operation sync failed after {} new operations: {}", stats.inserted, e);
				SyncState::NotSynced(e)
			}
		};

		guard.finish(outcome)
	}

	async fn sync_forward(
		&self,
		clear: bool,
		tracker: &mut SyncProgressTracker,
	) -> Result<(), SyncError> {
		// a resync walks from the start and swaps the history in with its first commit
		let latest = if clear {
			None
		} else {
			self.store.latest_operation()?
		};
		let mut replace = clear;
		let mut cursor = latest.as_ref().map(|op| op.paging_token.clone());
		let mut last_id = latest.map(|op| op.id);
		*tracker = SyncProgressTracker::new(SyncDirection::Forward, cursor.clone());

		loop {
			let records = self
				.client
				.fetch_operations_after(&self.account_id, cursor.as_deref(), self.page_size)
				.await?;
			tracker.record_page(records.len());

			let mut batch = self.build_batch(&records, SyncDirection::Forward, &mut last_id, tracker);
			if records.is_empty() && !replace {
				break;
			}
			batch.replace_history = replace;
			let outcome = self.store.append_operations(&batch)?;
			replace = false;
			tracker.record_commit(outcome.inserted, outcome.duplicates);
			tracker.log_progress(false);

			// undecodable records still carry the token the page continues from
			let next_cursor = records
				.iter()
				.rev()
				.map(|record| record.paging_token.as_str())
				.find(|token| !token.is_empty());
			let Some(next_cursor) = next_cursor else {
				break;
			};
			if records.len() < self.page_size {
				break;
			}
			cursor = Some(next_cursor.to_string());
		}

		tracker.log_progress(true);
		Ok(())
	}

	/// Fetch and store one page of operations older than the oldest stored one.
	///
	/// Errors are returned to the caller and do not affect [`Self::sync_state`].
	pub async fn request_older(&self) -> Result<BackfillOutcome, SyncError> {
		if self.store.operation_sync_meta()?.all_synced {
			return Ok(BackfillOutcome::AlreadySynced);
		}

		let Ok(_running) = self.backfill.try_lock() else {
			debug!("Backfill already in progress, skipping");
			return Ok(BackfillOutcome::InProgress);
		};

		let oldest = self.store.oldest_operation()?;
		let cursor = oldest.as_ref().map(|op| op.paging_token.clone());
		let mut last_id = oldest.map(|op| op.id);
		let mut tracker = SyncProgressTracker::new(SyncDirection::Backfill, cursor.clone());

		let records = self
			.client
			.fetch_operations_before(&self.account_id, cursor.as_deref(), self.page_size)
			.await?;
		tracker.record_page(records.len());

		let all_synced = records.len() < self.page_size;
		let mut batch = self.build_batch(&records, SyncDirection::Backfill, &mut last_id, &mut tracker);
		if all_synced {
			batch.meta = Some(OperationSyncMeta { all_synced: true });
		}

		let outcome = self.store.append_operations(&batch)?;
		tracker.record_commit(outcome.inserted, outcome.duplicates);
		if outcome.inserted > 0 {
			self.changes.send_modify(|count| *count += 1);
		}

		info!("{}", tracker.get_stats().summary());
		if all_synced {
			info!("Operation history fully synced");
		}

		Ok(BackfillOutcome::Fetched {
			inserted: outcome.inserted,
			all_synced,
		})
	}

	/// Normalize a page, keeping only records that continue the id order of the run.
	fn build_batch(
		&self,
		records: &[OperationRecord],
		direction: SyncDirection,
		last_id: &mut Option<i64>,
		tracker: &mut SyncProgressTracker,
	) -> OperationBatch {
		let mut batch = OperationBatch::default();

		for record in records {
			let operation = match Operation::from_record(record) {
				Ok(operation) => operation,
				Err(e) => {
					warn!("Skipping operation record: {}", e);
					tracker.record_skipped();
					continue;
				}
			};

			let in_order = match (direction, *last_id) {
				(_, None) => true,
				(SyncDirection::Forward, Some(last)) => operation.id > last,
				(SyncDirection::Backfill, Some(last)) => operation.id < last,
			};
			if !in_order {
				warn!(
					"Skipping operation {} out of order after {:?} ({:?})",
					operation.id, last_id, direction
				);
				tracker.record_skipped();
				continue;
			}

			*last_id = Some(operation.id);
			tracker.record_operation(operation.id);
			batch.tags.extend(operation.tags(&self.account_id));
			batch.operations.push(operation);
		}

		batch
	}
}
