//! Tag index query engine.
//!
//! Translates a typed [`OperationQuery`] into a single parameterized statement. Filter values
//! are always bound as parameters; only fixed clause fragments are composed.

use super::store::{OPERATION_COLUMNS, StorageError, read_operation};
use crate::models::{ACCOUNT_IDS_DELIMITER, Direction, Operation, TagQuery};

use rusqlite::Connection;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

/// Default page size for history reads.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// A page request over the local operation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationQuery {
	pub filter: TagQuery,
	/// Exclusive bound on the operation id; `None` is unbounded.
	pub cursor: Option<i64>,
	pub direction: Direction,
	pub limit: usize,
}

impl Default for OperationQuery {
	fn default() -> Self {
		Self {
			filter: TagQuery::default(),
			cursor: None,
			direction: Direction::Before,
			limit: DEFAULT_QUERY_LIMIT,
		}
	}
}

impl OperationQuery {
	pub fn before(filter: TagQuery, cursor: Option<i64>, limit: usize) -> Self {
		Self {
			filter,
			cursor,
			direction: Direction::Before,
			limit,
		}
	}

	pub fn after(filter: TagQuery, cursor: Option<i64>, limit: usize) -> Self {
		Self {
			filter,
			cursor,
			direction: Direction::After,
			limit,
		}
	}

	fn validate(&self) -> Result<(), StorageError> {
		if let Some(asset_id) = &self.filter.asset_id {
			if asset_id.is_empty() {
				return Err(StorageError::InvalidQuery("empty asset id".to_string()));
			}
		}

		if let Some(account_id) = &self.filter.account_id {
			if account_id.is_empty() || account_id.contains(ACCOUNT_IDS_DELIMITER) {
				return Err(StorageError::InvalidQuery(format!(
					"invalid account id `{}`",
					account_id
				)));
			}
		}

		Ok(())
	}
}

/// Run `query` against `conn`.
///
/// The caller holds the connection for the whole read, so the result reflects exactly the
/// writes committed before the call.
pub(crate) fn select_operations(
	conn: &Connection,
	query: &OperationQuery,
) -> Result<Vec<Operation>, StorageError> {
	query.validate()?;
	if query.limit == 0 {
		return Ok(Vec::new());
	}

	let (sql, params) = build_select(query);
	let mut stmt = conn.prepare_cached(&sql)?;
	let rows = stmt.query_map(rusqlite::params_from_iter(params), read_operation)?;
	let operations = rows.collect::<Result<Vec<_>, _>>()?;

	Ok(operations)
}

/// SQL text and bound values for a validated query. Every value, the list delimiter included,
/// is a parameter.
fn build_select(query: &OperationQuery) -> (String, Vec<Value>) {
	let mut conditions: Vec<&'static str> = Vec::new();
	let mut params: Vec<Value> = Vec::new();

	let join = if query.filter.is_empty() {
		""
	} else {
		if let Some(tag_type) = query.filter.tag_type {
			conditions.push("tag.type = ?");
			params.push(Value::Text(tag_type.as_str().to_string()));
		}
		if let Some(asset_id) = &query.filter.asset_id {
			conditions.push("tag.asset_id = ?");
			params.push(Value::Text(asset_id.clone()));
		}
		if let Some(account_id) = &query.filter.account_id {
			// exact membership in the delimited list
			conditions.push("instr(? || tag.account_ids || ?, ?) > 0");
			params.push(Value::Text(ACCOUNT_IDS_DELIMITER.to_string()));
			params.push(Value::Text(ACCOUNT_IDS_DELIMITER.to_string()));
			params.push(Value::Text(format!(
				"{d}{}{d}",
				account_id,
				d = ACCOUNT_IDS_DELIMITER
			)));
		}
		"INNER JOIN tag ON operation.id = tag.operation_id"
	};

	let order = match query.direction {
		Direction::Before => {
			if let Some(cursor) = query.cursor {
				conditions.push("operation.id < ?");
				params.push(Value::Integer(cursor));
			}
			"DESC"
		}
		Direction::After => {
			if let Some(cursor) = query.cursor {
				conditions.push("operation.id > ?");
				params.push(Value::Integer(cursor));
			}
			"ASC"
		}
	};

	let where_clause = if conditions.is_empty() {
		String::new()
	} else {
		format!("WHERE {}", conditions.join(" AND "))
	};

	params.push(Value::Integer(
		i64::try_from(query.limit).unwrap_or(i64::MAX),
	));

	let sql = format!(
		"SELECT DISTINCT {} FROM operation {} {} ORDER BY operation.id {} LIMIT ?",
		OPERATION_COLUMNS, join, where_clause, order
	);

	(sql, params)
}
