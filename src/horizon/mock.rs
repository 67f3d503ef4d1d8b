//! Scripted `LedgerClient` used by the sync engine tests.

use super::client::{LedgerClient, OperationStream};
use super::types::*;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, mpsc};

pub type StreamSender = mpsc::UnboundedSender<Result<OperationRecord, HorizonError>>;

#[derive(Default)]
struct MockState {
	/// `None` answers every account fetch with `NotFound`.
	account: Option<AccountRecord>,
	account_failure: Option<String>,
	/// Kept sorted by numeric id.
	operations: Vec<OperationRecord>,
	/// 1-based call numbers of `fetch_operations_after` that fail.
	failing_after_calls: HashSet<usize>,
	subscriptions: VecDeque<mpsc::UnboundedReceiver<Result<OperationRecord, HorizonError>>>,
	account_calls: usize,
	after_calls: usize,
	before_calls: usize,
	subscribe_calls: usize,
}

#[derive(Default)]
pub struct MockLedgerClient {
	state: Mutex<MockState>,
	/// When set, `fetch_account` waits for a permit before answering.
	account_gate: Mutex<Option<Arc<Semaphore>>>,
	/// Same for `fetch_operations_after`.
	operations_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockLedgerClient {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_account(&self, account: Option<AccountRecord>) {
		let mut state = self.state.lock().unwrap();
		state.account = account;
		state.account_failure = None;
	}

	pub fn fail_account(&self, message: &str) {
		self.state.lock().unwrap().account_failure = Some(message.to_string());
	}

	pub fn push_operations(&self, records: Vec<OperationRecord>) {
		let mut state = self.state.lock().unwrap();
		state.operations.extend(records);
		state
			.operations
			.sort_by_key(|r| r.id.parse::<i64>().unwrap_or(i64::MAX));
	}

	pub fn fail_after_call(&self, call: usize) {
		self.state.lock().unwrap().failing_after_calls.insert(call);
	}

	/// Queue a subscription; the returned sender drives it and dropping it closes the stream.
	pub fn queue_subscription(&self) -> StreamSender {
		let (tx, rx) = mpsc::unbounded_channel();
		self.state.lock().unwrap().subscriptions.push_back(rx);
		tx
	}

	pub fn gate_account(&self) -> Arc<Semaphore> {
		let gate = Arc::new(Semaphore::new(0));
		*self.account_gate.lock().unwrap() = Some(gate.clone());
		gate
	}

	pub fn gate_operations(&self) -> Arc<Semaphore> {
		let gate = Arc::new(Semaphore::new(0));
		*self.operations_gate.lock().unwrap() = Some(gate.clone());
		gate
	}

	pub fn account_calls(&self) -> usize {
		self.state.lock().unwrap().account_calls
	}

	pub fn after_calls(&self) -> usize {
		self.state.lock().unwrap().after_calls
	}

	pub fn before_calls(&self) -> usize {
		self.state.lock().unwrap().before_calls
	}

	pub fn subscribe_calls(&self) -> usize {
		self.state.lock().unwrap().subscribe_calls
	}
}

async fn wait_for_gate(gate: &Mutex<Option<Arc<Semaphore>>>) {
	let gate = gate.lock().unwrap().clone();
	if let Some(gate) = gate {
		let permit = gate.acquire().await.unwrap();
		permit.forget();
	}
}

fn position(cursor: Option<&str>) -> Option<i64> {
	cursor.and_then(|c| c.parse::<i64>().ok())
}

fn record_id(record: &OperationRecord) -> i64 {
	record.id.parse::<i64>().unwrap_or(i64::MAX)
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
	async fn fetch_account(&self, _account_id: &str) -> Result<AccountRecord, HorizonError> {
		wait_for_gate(&self.account_gate).await;

		let mut state = self.state.lock().unwrap();
		state.account_calls += 1;
		if let Some(message) = &state.account_failure {
			return Err(HorizonError::Status {
				status: 503,
				message: message.clone(),
			});
		}
		state.account.clone().ok_or(HorizonError::NotFound)
	}

	async fn fetch_operations_after(
		&self,
		_account_id: &str,
		cursor: Option<&str>,
		limit: usize,
	) -> Result<Vec<OperationRecord>, HorizonError> {
		wait_for_gate(&self.operations_gate).await;

		let mut state = self.state.lock().unwrap();
		state.after_calls += 1;
		if state.failing_after_calls.contains(&state.after_calls) {
			return Err(HorizonError::StreamError("connection reset".to_string()));
		}

		let from = position(cursor);
		Ok(state
			.operations
			.iter()
			.filter(|r| from.is_none_or(|from| record_id(r) > from))
			.take(limit)
			.cloned()
			.collect())
	}

	async fn fetch_operations_before(
		&self,
		_account_id: &str,
		cursor: Option<&str>,
		limit: usize,
	) -> Result<Vec<OperationRecord>, HorizonError> {
		let mut state = self.state.lock().unwrap();
		state.before_calls += 1;

		let to = position(cursor);
		Ok(state
			.operations
			.iter()
			.rev()
			.filter(|r| to.is_none_or(|to| record_id(r) < to))
			.take(limit)
			.cloned()
			.collect())
	}

	async fn subscribe_operations(&self, _account_id: &str) -> Result<OperationStream, HorizonError> {
		let mut state = self.state.lock().unwrap();
		state.subscribe_calls += 1;

		match state.subscriptions.pop_front() {
			Some(mut rx) => Ok(Box::pin(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)))),
			None => Ok(Box::pin(futures::stream::pending::<
				Result<OperationRecord, HorizonError>,
			>())),
		}
	}
}

fn base_record(id: i64, source: &str, operation_type: &str) -> OperationRecord {
	OperationRecord {
		id: id.to_string(),
		paging_token: id.to_string(),
		transaction_successful: true,
		source_account: source.to_string(),
		operation_type: operation_type.to_string(),
		created_at: "2024-05-01T10:00:00Z".to_string(),
		transaction_hash: format!("tx-{}", id),
		..Default::default()
	}
}

pub fn payment_record(
	id: i64,
	from: &str,
	to: &str,
	amount: &str,
	asset: Option<(&str, &str)>,
) -> OperationRecord {
	let mut record = base_record(id, from, "payment");
	record.amount = Some(amount.to_string());
	record.from = Some(from.to_string());
	record.to = Some(to.to_string());
	match asset {
		Some((code, issuer)) => {
			record.asset_type = Some("credit_alphanum4".to_string());
			record.asset_code = Some(code.to_string());
			record.asset_issuer = Some(issuer.to_string());
		}
		None => record.asset_type = Some("native".to_string()),
	}
	record
}

pub fn create_account_record(id: i64, funder: &str, account: &str, amount: &str) -> OperationRecord {
	let mut record = base_record(id, funder, "create_account");
	record.starting_balance = Some(amount.to_string());
	record.funder = Some(funder.to_string());
	record.account = Some(account.to_string());
	record
}

/// `asset` of `None` builds a liquidity pool share trustline.
pub fn change_trust_record(
	id: i64,
	trustor: &str,
	asset: Option<(&str, &str)>,
	pool_id: Option<&str>,
) -> OperationRecord {
	let mut record = base_record(id, trustor, "change_trust");
	record.trustor = Some(trustor.to_string());
	record.limit = Some("922337203685.4775807".to_string());
	record.liquidity_pool_id = pool_id.map(str::to_string);
	match asset {
		Some((code, issuer)) => {
			record.asset_type = Some("credit_alphanum4".to_string());
			record.asset_code = Some(code.to_string());
			record.asset_issuer = Some(issuer.to_string());
			record.trustee = Some(issuer.to_string());
		}
		None => record.asset_type = Some("liquidity_pool_shares".to_string()),
	}
	record
}

pub fn account_record(
	account_id: &str,
	subentry_count: u32,
	balances: &[(&str, Option<(&str, &str)>)],
) -> AccountRecord {
	AccountRecord {
		account_id: account_id.to_string(),
		subentry_count,
		balances: balances
			.iter()
			.map(|(amount, asset)| match asset {
				Some((code, issuer)) => BalanceRecord {
					balance: amount.to_string(),
					asset_type: "credit_alphanum4".to_string(),
					asset_code: Some(code.to_string()),
					asset_issuer: Some(issuer.to_string()),
					liquidity_pool_id: None,
				},
				None => BalanceRecord {
					balance: amount.to_string(),
					asset_type: "native".to_string(),
					asset_code: None,
					asset_issuer: None,
					liquidity_pool_id: None,
				},
			})
			.collect(),
	}
}
