//! Derived index rows and the filter used to query them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delimiter used when `account_ids` is persisted as a single column.
pub const ACCOUNT_IDS_DELIMITER: char = '|';

/// Direction of an operation from the tracked account's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagType {
	Incoming,
	Outgoing,
}

impl TagType {
	pub fn as_str(&self) -> &'static str {
		match self {
			TagType::Incoming => "Incoming",
			TagType::Outgoing => "Outgoing",
		}
	}
}

impl fmt::Display for TagType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for TagType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"Incoming" => Ok(TagType::Incoming),
			"Outgoing" => Ok(TagType::Outgoing),
			other => Err(format!("unknown tag type: {}", other)),
		}
	}
}

/// Secondary-index row pointing at a stored operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
	pub operation_id: i64,
	pub tag_type: TagType,
	pub asset_id: String,
	/// Counterparty addresses involved in the operation.
	pub account_ids: Vec<String>,
}

impl Tag {
	pub fn new(
		operation_id: i64,
		tag_type: TagType,
		asset_id: impl Into<String>,
		account_ids: Vec<String>,
	) -> Self {
		Self {
			operation_id,
			tag_type,
			asset_id: asset_id.into(),
			account_ids,
		}
	}
}

/// Conjunction of optional predicates over tag rows.
///
/// An empty query matches every operation, including those that produced no tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagQuery {
	pub tag_type: Option<TagType>,
	pub asset_id: Option<String>,
	/// Matches when this address is one of the tag's counterparties.
	pub account_id: Option<String>,
}

impl TagQuery {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_type(mut self, tag_type: TagType) -> Self {
		self.tag_type = Some(tag_type);
		self
	}

	pub fn with_asset_id(mut self, asset_id: impl Into<String>) -> Self {
		self.asset_id = Some(asset_id.into());
		self
	}

	pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
		self.account_id = Some(account_id.into());
		self
	}

	pub fn is_empty(&self) -> bool {
		self.tag_type.is_none() && self.asset_id.is_none() && self.account_id.is_none()
	}
}

/// Which side of the cursor a page is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
	/// Ids strictly below the cursor, newest first.
	#[default]
	Before,
	/// Ids strictly above the cursor, oldest first.
	After,
}
