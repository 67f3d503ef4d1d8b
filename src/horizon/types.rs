//! Raw records returned by the Horizon API

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Account document from `GET /accounts/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
	/// The account address.
	pub account_id: String,
	/// Number of trustlines, offers, signers and data entries owned by the account.
	#[serde(default)]
	pub subentry_count: u32,
	/// Every balance line held by the account, native included.
	#[serde(default)]
	pub balances: Vec<BalanceRecord>,
}

/// One balance line of an account document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceRecord {
	/// Decimal amount as a string (7 fractional digits).
	pub balance: String,
	/// `native`, `credit_alphanum4`, `credit_alphanum12` or `liquidity_pool_shares`.
	pub asset_type: String,
	pub asset_code: Option<String>,
	pub asset_issuer: Option<String>,
	pub liquidity_pool_id: Option<String>,
}

/// Parent transaction of an operation, embedded with `join=transactions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionRecord {
	pub hash: Option<String>,
	pub memo_type: Option<String>,
	pub memo: Option<String>,
	pub successful: Option<bool>,
}

/// A ledger operation as returned by the operations endpoints and the event stream.
///
/// Fields that only exist for some operation types are optional; which ones are populated
/// depends on `operation_type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationRecord {
	/// Numeric id encoded as a string.
	pub id: String,
	pub paging_token: String,
	#[serde(default)]
	pub transaction_successful: bool,
	pub source_account: String,
	#[serde(rename = "type")]
	pub operation_type: String,
	/// RFC 3339 timestamp of the ledger close.
	pub created_at: String,
	pub transaction_hash: String,
	pub transaction: Option<TransactionRecord>,

	// payment
	pub amount: Option<String>,
	pub asset_type: Option<String>,
	pub asset_code: Option<String>,
	pub asset_issuer: Option<String>,
	pub from: Option<String>,
	pub to: Option<String>,

	// create_account
	pub starting_balance: Option<String>,
	pub funder: Option<String>,
	pub account: Option<String>,

	// change_trust
	pub trustor: Option<String>,
	pub trustee: Option<String>,
	pub limit: Option<String>,
	pub liquidity_pool_id: Option<String>,
}

/// HAL collection envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
	#[serde(rename = "_embedded")]
	pub embedded: Embedded<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Embedded<T> {
	pub records: Vec<T>,
}

impl Page<Value> {
	/// Decode every record of the page on its own.
	///
	/// A record that does not fit [`OperationRecord`] is kept with only its id and paging
	/// token: normalization rejects it later, but the page keeps its length and paging moves
	/// past it.
	pub fn into_operation_records(self) -> Vec<OperationRecord> {
		self.embedded
			.records
			.into_iter()
			.map(|value| match OperationRecord::deserialize(&value) {
				Ok(record) => record,
				Err(e) => {
					let id = string_field(&value, "id");
					warn!("Undecodable operation record {:?}: {}", id, e);
					OperationRecord {
						paging_token: value
							.get("paging_token")
							.and_then(Value::as_str)
							.map_or_else(|| id.clone(), str::to_string),
						id,
						..Default::default()
					}
				}
			})
			.collect()
	}
}

fn string_field(value: &Value, field: &str) -> String {
	value
		.get(field)
		.and_then(Value::as_str)
		.unwrap_or_default()
		.to_string()
}

/// Problem document returned with non-success status codes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProblemRecord {
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub detail: String,
}

/// Sort order for the paginated operations endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrder {
	Asc,
	Desc,
}

impl PageOrder {
	pub fn as_str(&self) -> &'static str {
		match self {
			PageOrder::Asc => "asc",
			PageOrder::Desc => "desc",
		}
	}
}

/// Error types for Horizon requests and streams
#[derive(Debug, thiserror::Error)]
pub enum HorizonError {
	#[error("Resource not found")]
	NotFound,

	#[error("HTTP status {status}: {message}")]
	Status { status: u16, message: String },

	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Stream error: {0}")]
	StreamError(String),
}

impl HorizonError {
	/// True for the 404 returned when an account has never been funded.
	pub fn is_not_found(&self) -> bool {
		matches!(self, HorizonError::NotFound)
	}
}
