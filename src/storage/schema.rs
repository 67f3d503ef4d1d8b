//! SQL schema for the local mirror.
//!
//! # Tables
//!
//! - `asset_balance` - one row per held asset, keyed by the asset identity string
//! - `operation` - append-only operation history keyed by the remote id; payload columns
//!   are grouped by `payload_kind` and left `NULL` for the other kinds
//! - `tag` - derived index rows keyed by `(operation_id, type, asset_id)`; `account_ids`
//!   holds the counterparties joined with `|`
//! - `operation_sync_meta` - singleton row with the backfill marker

use rusqlite::Connection;

/// Bumped whenever the layout below changes; older files are rebuilt from the remote.
pub const SCHEMA_VERSION: i64 = 1;

/// Key of the single `operation_sync_meta` row.
pub const SYNC_META_ID: &str = "unique_id";

pub const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS asset_balance (
	asset TEXT PRIMARY KEY,
	balance TEXT NOT NULL,
	min_balance TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS operation (
	id INTEGER PRIMARY KEY,
	timestamp INTEGER NOT NULL,
	paging_token TEXT NOT NULL,
	source_account TEXT NOT NULL,
	transaction_hash TEXT NOT NULL,
	transaction_successful INTEGER NOT NULL,
	memo TEXT,
	type TEXT NOT NULL,
	payload_kind TEXT NOT NULL,
	payment_amount TEXT,
	payment_asset TEXT,
	payment_from TEXT,
	payment_to TEXT,
	account_created_starting_balance TEXT,
	account_created_funder TEXT,
	account_created_account TEXT,
	change_trust_trustor TEXT,
	change_trust_trustee TEXT,
	change_trust_asset TEXT,
	change_trust_limit TEXT,
	change_trust_liquidity_pool_id TEXT
);

CREATE TABLE IF NOT EXISTS tag (
	operation_id INTEGER NOT NULL,
	type TEXT NOT NULL,
	asset_id TEXT NOT NULL,
	account_ids TEXT NOT NULL,
	PRIMARY KEY (operation_id, type, asset_id)
);
CREATE INDEX IF NOT EXISTS tag_type_asset ON tag(type, asset_id);

CREATE TABLE IF NOT EXISTS operation_sync_meta (
	id TEXT PRIMARY KEY,
	all_synced INTEGER NOT NULL
);
"#;

const DROP_SCHEMA: &str = r#"
DROP TABLE IF EXISTS asset_balance;
DROP TABLE IF EXISTS operation;
DROP TABLE IF EXISTS tag;
DROP TABLE IF EXISTS operation_sync_meta;
"#;

/// Create the tables, discarding a file written with a different schema version.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
	let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

	if version != SCHEMA_VERSION {
		if version != 0 {
			tracing::warn!(
				"Local store schema version {} does not match {}, rebuilding",
				version,
				SCHEMA_VERSION
			);
		}
		conn.execute_batch(DROP_SCHEMA)?;
		conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
	}

	conn.execute_batch(CREATE_SCHEMA)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_init_is_idempotent() {
		let conn = Connection::open_in_memory().unwrap();
		init_schema(&conn).unwrap();
		conn.execute(
			"INSERT INTO operation_sync_meta (id, all_synced) VALUES (?1, 1)",
			[SYNC_META_ID],
		)
		.unwrap();

		init_schema(&conn).unwrap();
		let count: i64 = conn
			.query_row("SELECT COUNT(*) FROM operation_sync_meta", [], |row| row.get(0))
			.unwrap();
		assert_eq!(count, 1);
	}

	#[test]
	fn test_version_mismatch_rebuilds() {
		let conn = Connection::open_in_memory().unwrap();
		init_schema(&conn).unwrap();
		conn.execute(
			"INSERT INTO operation_sync_meta (id, all_synced) VALUES (?1, 1)",
			[SYNC_META_ID],
		)
		.unwrap();
		conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
			.unwrap();

		init_schema(&conn).unwrap();
		let count: i64 = conn
			.query_row("SELECT COUNT(*) FROM operation_sync_meta", [], |row| row.get(0))
			.unwrap();
		assert_eq!(count, 0);
	}
}
