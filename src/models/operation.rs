//! Canonical operation records and the tag rows derived from them.
//!
//! Raw Horizon records are normalized once, at sync time, into an [`Operation`]. Only the
//! payment, account creation and trustline change types carry a typed payload; every other
//! type is kept with [`OperationPayload::Other`] so it still shows up in unfiltered history.

use super::asset::StellarAsset;
use super::tag::{Tag, TagType};
use crate::horizon::OperationRecord;

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Raw `type` values that map onto a typed payload.
pub mod types {
	pub const PAYMENT: &str = "payment";
	pub const CREATE_ACCOUNT: &str = "create_account";
	pub const CHANGE_TRUST: &str = "change_trust";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
	pub amount: Decimal,
	pub asset: StellarAsset,
	pub from: String,
	pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
	pub starting_balance: Decimal,
	pub funder: String,
	pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTrust {
	pub trustor: String,
	/// Issuer side of the trustline; absent for liquidity pool shares.
	pub trustee: Option<String>,
	/// `None` when the trustline is for liquidity pool shares.
	pub asset: Option<StellarAsset>,
	pub limit: Decimal,
	pub liquidity_pool_id: Option<String>,
}

/// At most one typed payload per operation, selected by the raw type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationPayload {
	Payment(Payment),
	AccountCreated(AccountCreated),
	ChangeTrust(ChangeTrust),
	Other,
}

impl OperationPayload {
	/// Discriminator persisted alongside the payload columns.
	pub fn kind(&self) -> &'static str {
		match self {
			OperationPayload::Payment(_) => "payment",
			OperationPayload::AccountCreated(_) => "account_created",
			OperationPayload::ChangeTrust(_) => "change_trust",
			OperationPayload::Other => "other",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
	/// Remote id; strictly increasing in ledger order.
	pub id: i64,
	/// Unix seconds.
	pub timestamp: i64,
	pub paging_token: String,
	pub source_account: String,
	pub transaction_hash: String,
	pub transaction_successful: bool,
	pub memo: Option<String>,
	/// Raw remote type string.
	pub operation_type: String,
	pub payload: OperationPayload,
}

/// A raw record that could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
	#[error("operation {id}: missing field `{field}`")]
	MissingField { id: String, field: &'static str },

	#[error("operation {id}: invalid {field} `{value}`")]
	InvalidField {
		id: String,
		field: &'static str,
		value: String,
	},
}

impl Operation {
	pub fn payment(&self) -> Option<&Payment> {
		match &self.payload {
			OperationPayload::Payment(payment) => Some(payment),
			_ => None,
		}
	}

	pub fn account_created(&self) -> Option<&AccountCreated> {
		match &self.payload {
			OperationPayload::AccountCreated(created) => Some(created),
			_ => None,
		}
	}

	pub fn change_trust(&self) -> Option<&ChangeTrust> {
		match &self.payload {
			OperationPayload::ChangeTrust(change) => Some(change),
			_ => None,
		}
	}

	/// Normalize a raw Horizon record.
	pub fn from_record(record: &OperationRecord) -> Result<Self, RecordError> {
		let id = record
			.id
			.parse::<i64>()
			.map_err(|_| invalid(record, "id", &record.id))?;

		let timestamp = DateTime::parse_from_rfc3339(&record.created_at)
			.map_err(|_| invalid(record, "created_at", &record.created_at))?
			.timestamp();

		let payload = match record.operation_type.as_str() {
			types::PAYMENT => OperationPayload::Payment(Payment {
				amount: decimal(record, "amount", record.amount.as_deref())?,
				asset: asset(record)?,
				from: required(record, "from", record.from.as_deref())?,
				to: required(record, "to", record.to.as_deref())?,
			}),
			types::CREATE_ACCOUNT => OperationPayload::AccountCreated(AccountCreated {
				starting_balance: decimal(
					record,
					"starting_balance",
					record.starting_balance.as_deref(),
				)?,
				funder: required(record, "funder", record.funder.as_deref())?,
				account: required(record, "account", record.account.as_deref())?,
			}),
			types::CHANGE_TRUST => {
				let asset = match record.asset_type.as_deref() {
					Some("liquidity_pool_shares") => None,
					_ => Some(asset(record)?),
				};
				OperationPayload::ChangeTrust(ChangeTrust {
					trustor: required(record, "trustor", record.trustor.as_deref())?,
					trustee: record.trustee.clone(),
					asset,
					limit: decimal(record, "limit", record.limit.as_deref())?,
					liquidity_pool_id: record.liquidity_pool_id.clone(),
				})
			}
			_ => OperationPayload::Other,
		};

		let memo = record
			.transaction
			.as_ref()
			.filter(|tx| tx.memo_type.as_deref() == Some("text"))
			.and_then(|tx| tx.memo.clone());

		Ok(Operation {
			id,
			timestamp,
			paging_token: record.paging_token.clone(),
			source_account: record.source_account.clone(),
			transaction_hash: record.transaction_hash.clone(),
			transaction_successful: record.transaction_successful,
			memo,
			operation_type: record.operation_type.clone(),
			payload,
		})
	}

	/// Tags relevant to `account_id`.
	///
	/// Outgoing when the account is the paying/funding/trustee side, Incoming when it is the
	/// receiving/created/trustor side. A self-payment yields both.
	pub fn tags(&self, account_id: &str) -> Vec<Tag> {
		let mut tags = Vec::new();

		match &self.payload {
			OperationPayload::AccountCreated(created) => {
				let asset_id = StellarAsset::Native.id();
				if created.funder == account_id {
					tags.push(Tag::new(
						self.id,
						TagType::Outgoing,
						asset_id.clone(),
						vec![created.account.clone()],
					));
				}
				if created.account == account_id {
					tags.push(Tag::new(
						self.id,
						TagType::Incoming,
						asset_id,
						vec![created.funder.clone()],
					));
				}
			}
			OperationPayload::Payment(payment) => {
				let asset_id = payment.asset.id();
				if payment.from == account_id {
					tags.push(Tag::new(
						self.id,
						TagType::Outgoing,
						asset_id.clone(),
						vec![payment.to.clone()],
					));
				}
				if payment.to == account_id {
					tags.push(Tag::new(
						self.id,
						TagType::Incoming,
						asset_id,
						vec![payment.from.clone()],
					));
				}
			}
			OperationPayload::ChangeTrust(change) => {
				// Pool-share trustlines have no asset or trustee to index on.
				if let (Some(asset), Some(trustee)) = (&change.asset, &change.trustee) {
					let asset_id = asset.id();
					if trustee == account_id {
						tags.push(Tag::new(
							self.id,
							TagType::Outgoing,
							asset_id.clone(),
							vec![change.trustor.clone()],
						));
					}
					if change.trustor == account_id {
						tags.push(Tag::new(
							self.id,
							TagType::Incoming,
							asset_id,
							vec![trustee.clone()],
						));
					}
				}
			}
			OperationPayload::Other => {}
		}

		tags
	}
}

fn invalid(record: &OperationRecord, field: &'static str, value: &str) -> RecordError {
	RecordError::InvalidField {
		id: record.id.clone(),
		field,
		value: value.to_string(),
	}
}

fn required(
	record: &OperationRecord,
	field: &'static str,
	value: Option<&str>,
) -> Result<String, RecordError> {
	value.map(str::to_string).ok_or(RecordError::MissingField {
		id: record.id.clone(),
		field,
	})
}

fn decimal(
	record: &OperationRecord,
	field: &'static str,
	value: Option<&str>,
) -> Result<Decimal, RecordError> {
	let raw = required(record, field, value)?;
	Decimal::from_str(&raw).map_err(|_| invalid(record, field, &raw))
}

fn asset(record: &OperationRecord) -> Result<StellarAsset, RecordError> {
	let asset_type = required(record, "asset_type", record.asset_type.as_deref())?;
	StellarAsset::from_horizon(
		&asset_type,
		record.asset_code.as_deref(),
		record.asset_issuer.as_deref(),
	)
	.ok_or_else(|| invalid(record, "asset_type", &asset_type))
}
