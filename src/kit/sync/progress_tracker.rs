//! Progress tracking for operation synchronization.
//!
//! A [`SyncProgressTracker`] lives for one forward sync or one backfill page run. It counts
//! pages, received records, inserted and duplicate operations and skipped records, and
//! remembers the id range that was covered so the run can be summarized in one log line.

use tracing::info;

/// Which way a run walks the remote history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
	Forward,
	Backfill,
}

#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
	direction: SyncDirection,
	/// Stored cursor the run started from, if any
	start_cursor: Option<String>,
	pages_fetched: usize,
	records_received: usize,
	inserted: usize,
	duplicates: usize,
	skipped: usize,
	lowest_id: Option<i64>,
	highest_id: Option<i64>,
	/// Inserted count at the last progress log line
	last_logged: usize,
}

impl SyncProgressTracker {
	pub fn new(direction: SyncDirection, start_cursor: Option<String>) -> Self {
		Self {
			direction,
			start_cursor,
			pages_fetched: 0,
			records_received: 0,
			inserted: 0,
			duplicates: 0,
			skipped: 0,
			lowest_id: None,
			highest_id: None,
			last_logged: 0,
		}
	}

	/// Record one fetched page of `records` raw records.
	pub fn record_page(&mut self, records: usize) {
		self.pages_fetched += 1;
		self.records_received += records;
	}

	/// Record a normalized operation accepted for the batch.
	pub fn record_operation(&mut self, id: i64) {
		self.lowest_id = Some(self.lowest_id.map_or(id, |low| low.min(id)));
		self.highest_id = Some(self.highest_id.map_or(id, |high| high.max(id)));
	}

	pub fn record_skipped(&mut self) {
		self.skipped += 1;
	}

	/// Record the outcome of committing one page.
	pub fn record_commit(&mut self, inserted: usize, duplicates: usize) {
		self.inserted += inserted;
		self.duplicates += duplicates;
	}

	/// Log every 500 inserted operations, or when forced.
	pub fn log_progress(&mut self, force: bool) {
		let should_log = force || self.inserted.saturating_sub(self.last_logged) >= 500;

		if should_log && self.records_received > 0 {
			info!(
				"{:?} sync progress: {} pages, {} operations stored, highest id {:?}",
				self.direction, self.pages_fetched, self.inserted, self.highest_id
			);
			self.last_logged = self.inserted;
		}
	}

	pub fn get_stats(&self) -> SyncStats {
		SyncStats {
			direction: self.direction,
			start_cursor: self.start_cursor.clone(),
			pages_fetched: self.pages_fetched,
			records_received: self.records_received,
			inserted: self.inserted,
			duplicates: self.duplicates,
			skipped: self.skipped,
			lowest_id: self.lowest_id,
			highest_id: self.highest_id,
		}
	}
}

/// Statistics of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
	pub direction: SyncDirection,
	pub start_cursor: Option<String>,
	pub pages_fetched: usize,
	pub records_received: usize,
	pub inserted: usize,
	pub duplicates: usize,
	pub skipped: usize,
	pub lowest_id: Option<i64>,
	pub highest_id: Option<i64>,
}

impl SyncStats {
	/// Get a human-readable summary of the run
	pub fn summary(&self) -> String {
		let range = match (self.lowest_id, self.highest_id) {
			(Some(low), Some(high)) => format!("ids {}..={}", low, high),
			_ => "no new ids".to_string(),
		};

		format!(
			"{:?} sync from {}: {} pages, {} received, {} inserted, {} duplicates, {}{}",
			self.direction,
			self.start_cursor.as_deref().unwrap_or("start"),
			self.pages_fetched,
			self.records_received,
			self.inserted,
			self.duplicates,
			range,
			if self.skipped == 0 {
				String::new()
			} else {
				format!(" ({} skipped)", self.skipped)
			}
		)
	}
}
