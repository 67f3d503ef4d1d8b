//! SQLite-backed local store.
//!
//! `KitStore` owns a single connection behind a mutex: writes are short transactions and
//! every read runs while holding the same lock, so readers never observe a half-applied
//! batch. Balance rows are additionally published through a watch channel after each
//! committed replace.

use super::query::{OperationQuery, select_operations};
use super::schema::{SYNC_META_ID, init_schema};
use crate::models::{
	ACCOUNT_IDS_DELIMITER, AccountCreated, AssetBalance, ChangeTrust, Operation,
	OperationPayload, OperationSyncMeta, Payment, StellarAsset, Tag, TagType,
};

use itertools::Itertools;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};

/// Error types for the local store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
	#[error("Database error: {0}")]
	Sqlite(#[from] rusqlite::Error),

	#[error("Store lock poisoned")]
	Poisoned,

	#[error("Invalid query: {0}")]
	InvalidQuery(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Operations, their tags and an optional sync marker, committed in one transaction.
#[derive(Debug, Clone, Default)]
pub struct OperationBatch {
	pub operations: Vec<Operation>,
	pub tags: Vec<Tag>,
	pub meta: Option<OperationSyncMeta>,
	/// Drop the stored history, its tags and the backfill marker before appending.
	pub replace_history: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
	pub inserted: usize,
	/// Operations whose id was already stored; their tags were not touched.
	pub duplicates: usize,
}

pub(crate) const OPERATION_COLUMNS: &str = "operation.id, operation.timestamp, \
	operation.paging_token, operation.source_account, operation.transaction_hash, \
	operation.transaction_successful, operation.memo, operation.type, operation.payload_kind, \
	operation.payment_amount, operation.payment_asset, operation.payment_from, \
	operation.payment_to, operation.account_created_starting_balance, \
	operation.account_created_funder, operation.account_created_account, \
	operation.change_trust_trustor, operation.change_trust_trustee, \
	operation.change_trust_asset, operation.change_trust_limit, \
	operation.change_trust_liquidity_pool_id";

pub struct KitStore {
	conn: Mutex<Connection>,
	balances: watch::Sender<Vec<AssetBalance>>,
}

impl KitStore {
	pub fn open(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		info!("Opening local store at {:?}", path);
		Self::from_connection(Connection::open(path)?)
	}

	pub fn open_in_memory() -> Result<Self> {
		Self::from_connection(Connection::open_in_memory()?)
	}

	fn from_connection(conn: Connection) -> Result<Self> {
		init_schema(&conn)?;
		let balances = load_balances(&conn)?;
		let (balances_tx, _) = watch::channel(balances);

		Ok(Self {
			conn: Mutex::new(conn),
			balances: balances_tx,
		})
	}

	fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
		self.conn.lock().map_err(|_| StorageError::Poisoned)
	}

	/// Atomically replace every balance row.
	pub fn replace_balances(&self, balances: &[AssetBalance]) -> Result<()> {
		let mut conn = self.lock()?;
		let tx = conn.transaction()?;
		tx.execute("DELETE FROM asset_balance", [])?;
		{
			let mut stmt = tx.prepare(
				"INSERT INTO asset_balance (asset, balance, min_balance) VALUES (?1, ?2, ?3)",
			)?;
			for balance in balances {
				stmt.execute(params![
					balance.asset,
					balance.balance.to_string(),
					balance.min_balance.to_string(),
				])?;
			}
		}
		tx.commit()?;

		// Published under the connection lock so subscribers see replaces in commit order.
		self.balances.send_replace(balances.to_vec());
		debug!("Replaced local balance set with {} rows", balances.len());
		Ok(())
	}

	pub fn all_balances(&self) -> Result<Vec<AssetBalance>> {
		let conn = self.lock()?;
		load_balances(&conn)
	}

	pub fn balance(&self, asset: &StellarAsset) -> Result<Option<AssetBalance>> {
		let conn = self.lock()?;
		let balance = conn
			.query_row(
				"SELECT asset, balance, min_balance FROM asset_balance WHERE asset = ?1",
				[asset],
				read_balance,
			)
			.optional()?;
		Ok(balance)
	}

	/// Receiver holding the latest committed balance set.
	pub fn subscribe_balances(&self) -> watch::Receiver<Vec<AssetBalance>> {
		self.balances.subscribe()
	}

	/// Append operations and the tags of the ones not stored yet, plus the sync marker.
	///
	/// Operations whose id is already present are skipped together with their tags, so
	/// re-delivering a page never duplicates rows.
	pub fn append_operations(&self, batch: &OperationBatch) -> Result<AppendOutcome> {
		let mut conn = self.lock()?;
		let tx = conn.transaction()?;
		let mut outcome = AppendOutcome::default();
		let mut inserted_ids = HashSet::new();

		if batch.replace_history {
			tx.execute("DELETE FROM tag", [])?;
			tx.execute("DELETE FROM operation", [])?;
			tx.execute("DELETE FROM operation_sync_meta", [])?;
			info!("Replacing local operation history");
		}

		{
			let mut stmt = tx.prepare(
				"INSERT OR IGNORE INTO operation (id, timestamp, paging_token, source_account, \
				 transaction_hash, transaction_successful, memo, type, payload_kind, \
				 payment_amount, payment_asset, payment_from, payment_to, \
				 account_created_starting_balance, account_created_funder, account_created_account, \
				 change_trust_trustor, change_trust_trustee, change_trust_asset, change_trust_limit, \
				 change_trust_liquidity_pool_id) \
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
				 ?17, ?18, ?19, ?20, ?21)",
			)?;

			for op in &batch.operations {
				let payment = op.payment();
				let created = op.account_created();
				let change = op.change_trust();

				let changed = stmt.execute(params![
					op.id,
					op.timestamp,
					op.paging_token,
					op.source_account,
					op.transaction_hash,
					op.transaction_successful,
					op.memo,
					op.operation_type,
					op.payload.kind(),
					payment.map(|p| p.amount.to_string()),
					payment.map(|p| &p.asset),
					payment.map(|p| &p.from),
					payment.map(|p| &p.to),
					created.map(|c| c.starting_balance.to_string()),
					created.map(|c| &c.funder),
					created.map(|c| &c.account),
					change.map(|c| &c.trustor),
					change.and_then(|c| c.trustee.as_ref()),
					change.and_then(|c| c.asset.as_ref()),
					change.map(|c| c.limit.to_string()),
					change.and_then(|c| c.liquidity_pool_id.as_ref()),
				])?;

				if changed == 1 {
					inserted_ids.insert(op.id);
					outcome.inserted += 1;
				} else {
					outcome.duplicates += 1;
				}
			}
		}

		{
			let mut stmt = tx.prepare(
				"INSERT OR IGNORE INTO tag (operation_id, type, asset_id, account_ids) \
				 VALUES (?1, ?2, ?3, ?4)",
			)?;
			for tag in batch
				.tags
				.iter()
				.filter(|t| inserted_ids.contains(&t.operation_id))
			{
				stmt.execute(params![
					tag.operation_id,
					tag.tag_type,
					tag.asset_id,
					tag.account_ids.iter().join(&ACCOUNT_IDS_DELIMITER.to_string()),
				])?;
			}
		}

		if let Some(meta) = batch.meta {
			write_sync_meta(&tx, meta)?;
		}

		tx.commit()?;
		Ok(outcome)
	}

	pub fn latest_operation(&self) -> Result<Option<Operation>> {
		self.single_operation("ORDER BY operation.id DESC LIMIT 1")
	}

	pub fn oldest_operation(&self) -> Result<Option<Operation>> {
		self.single_operation("ORDER BY operation.id ASC LIMIT 1")
	}

	fn single_operation(&self, suffix: &str) -> Result<Option<Operation>> {
		let conn = self.lock()?;
		let sql = format!("SELECT {} FROM operation {}", OPERATION_COLUMNS, suffix);
		Ok(conn.query_row(&sql, [], read_operation).optional()?)
	}

	pub fn operation(&self, id: i64) -> Result<Option<Operation>> {
		let conn = self.lock()?;
		let sql = format!("SELECT {} FROM operation WHERE operation.id = ?1", OPERATION_COLUMNS);
		Ok(conn.query_row(&sql, [id], read_operation).optional()?)
	}

	pub fn operation_count(&self) -> Result<usize> {
		let conn = self.lock()?;
		let count: i64 = conn.query_row("SELECT COUNT(*) FROM operation", [], |row| row.get(0))?;
		Ok(usize::try_from(count).unwrap_or_default())
	}

	/// Tags stored for one operation, in key order.
	pub fn tags(&self, operation_id: i64) -> Result<Vec<Tag>> {
		let conn = self.lock()?;
		let mut stmt = conn.prepare_cached(
			"SELECT operation_id, type, asset_id, account_ids FROM tag \
			 WHERE operation_id = ?1 ORDER BY type, asset_id",
		)?;
		let tags = stmt
			.query_map([operation_id], read_tag)?
			.collect::<rusqlite::Result<Vec<_>>>()?;
		Ok(tags)
	}

	pub fn operation_sync_meta(&self) -> Result<OperationSyncMeta> {
		let conn = self.lock()?;
		let all_synced: Option<bool> = conn
			.query_row(
				"SELECT all_synced FROM operation_sync_meta WHERE id = ?1",
				[SYNC_META_ID],
				|row| row.get(0),
			)
			.optional()?;
		Ok(OperationSyncMeta {
			all_synced: all_synced.unwrap_or(false),
		})
	}

	/// Read a page of history. See [`OperationQuery`].
	pub fn query_operations(&self, query: &OperationQuery) -> Result<Vec<Operation>> {
		let conn = self.lock()?;
		select_operations(&conn, query)
	}
}

fn write_sync_meta(conn: &Connection, meta: OperationSyncMeta) -> rusqlite::Result<()> {
	conn.execute(
		"INSERT OR REPLACE INTO operation_sync_meta (id, all_synced) VALUES (?1, ?2)",
		params![SYNC_META_ID, meta.all_synced],
	)?;
	Ok(())
}

fn load_balances(conn: &Connection) -> Result<Vec<AssetBalance>> {
	let mut stmt =
		conn.prepare_cached("SELECT asset, balance, min_balance FROM asset_balance ORDER BY asset")?;
	let balances = stmt
		.query_map([], read_balance)?
		.collect::<rusqlite::Result<Vec<_>>>()?;
	Ok(balances)
}

impl ToSql for StellarAsset {
	fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
		Ok(ToSqlOutput::from(self.id()))
	}
}

impl FromSql for StellarAsset {
	fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
		StellarAsset::from_id(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
	}
}

impl ToSql for TagType {
	fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
		Ok(ToSqlOutput::from(self.as_str()))
	}
}

impl FromSql for TagType {
	fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
		value
			.as_str()?
			.parse::<TagType>()
			.map_err(|e| FromSqlError::Other(e.into()))
	}
}

fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
	let raw: String = row.get(idx)?;
	Decimal::from_str(&raw)
		.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn read_balance(row: &Row) -> rusqlite::Result<AssetBalance> {
	Ok(AssetBalance {
		asset: row.get(0)?,
		balance: decimal_column(row, 1)?,
		min_balance: decimal_column(row, 2)?,
	})
}

fn read_tag(row: &Row) -> rusqlite::Result<Tag> {
	let account_ids: String = row.get(3)?;
	Ok(Tag {
		operation_id: row.get(0)?,
		tag_type: row.get(1)?,
		asset_id: row.get(2)?,
		account_ids: account_ids
			.split(ACCOUNT_IDS_DELIMITER)
			.filter(|id| !id.is_empty())
			.map(str::to_string)
			.collect(),
	})
}

/// Decode a row selected with [`OPERATION_COLUMNS`].
pub(crate) fn read_operation(row: &Row) -> rusqlite::Result<Operation> {
	let payload_kind: String = row.get(8)?;
	let payload = match payload_kind.as_str() {
		"payment" => OperationPayload::Payment(Payment {
			amount: decimal_column(row, 9)?,
			asset: row.get(10)?,
			from: row.get(11)?,
			to: row.get(12)?,
		}),
		"account_created" => OperationPayload::AccountCreated(AccountCreated {
			starting_balance: decimal_column(row, 13)?,
			funder: row.get(14)?,
			account: row.get(15)?,
		}),
		"change_trust" => OperationPayload::ChangeTrust(ChangeTrust {
			trustor: row.get(16)?,
			trustee: row.get(17)?,
			asset: row.get(18)?,
			limit: decimal_column(row, 19)?,
			liquidity_pool_id: row.get(20)?,
		}),
		_ => OperationPayload::Other,
	};

	Ok(Operation {
		id: row.get(0)?,
		timestamp: row.get(1)?,
		paging_token: row.get(2)?,
		source_account: row.get(3)?,
		transaction_hash: row.get(4)?,
		transaction_successful: row.get(5)?,
		memo: row.get(6)?,
		operation_type: row.get(7)?,
		payload,
	})
}
