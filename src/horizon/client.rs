//!
//! HTTP client for the Horizon API of a Stellar network.
//!
//! This module provides the [`LedgerClient`] trait, the remote capability the synchronizers
//! and the update listener depend on, and [`HorizonClient`], its implementation over
//! Horizon's REST endpoints and server-sent event streams. All methods are async and
//! designed for use with Tokio.

use super::sse::SseDecoder;
use super::types::*;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, error, info};

/// Stream of operations pushed by the remote service. Ends when the transport closes.
pub type OperationStream = Pin<Box<dyn Stream<Item = Result<OperationRecord, HorizonError>> + Send>>;

/// Remote ledger capability consumed by the sync engine.
#[async_trait]
pub trait LedgerClient: Send + Sync {
	/// Fetch the account document. Returns [`HorizonError::NotFound`] for unfunded accounts.
	async fn fetch_account(&self, account_id: &str) -> Result<AccountRecord, HorizonError>;

	/// Operations strictly after `cursor`, oldest first. `None` starts at the beginning of history.
	async fn fetch_operations_after(
		&self,
		account_id: &str,
		cursor: Option<&str>,
		limit: usize,
	) -> Result<Vec<OperationRecord>, HorizonError>;

	/// Operations strictly before `cursor`, newest first. `None` starts at the latest operation.
	async fn fetch_operations_before(
		&self,
		account_id: &str,
		cursor: Option<&str>,
		limit: usize,
	) -> Result<Vec<OperationRecord>, HorizonError>;

	/// Subscribe to operations created from now on. Does not replay history.
	async fn subscribe_operations(&self, account_id: &str) -> Result<OperationStream, HorizonError>;
}

/// Horizon REST client
#[derive(Clone)]
pub struct HorizonClient {
	/// Client for paginated requests, with a request timeout.
	http_client: Client,
	/// Client for event streams, which stay open indefinitely.
	stream_client: Client,
	/// Base URL, without trailing slash.
	horizon_url: String,
}

impl HorizonClient {
	/// Create a new Horizon client.
	///
	/// # Arguments
	/// * `horizon_url` - Base URL of the Horizon server.
	pub fn new(horizon_url: impl Into<String>) -> Result<Self, HorizonError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
		let stream_client = Client::builder()
			.connect_timeout(Duration::from_secs(30))
			.build()?;

		Ok(Self {
			http_client,
			stream_client,
			horizon_url: horizon_url.into().trim_end_matches('/').to_string(),
		})
	}

	pub fn horizon_url(&self) -> &str {
		&self.horizon_url
	}

	fn operations_url(&self, account_id: &str) -> String {
		format!("{}/accounts/{}/operations", self.horizon_url, account_id)
	}

	async fn fetch_operations(
		&self,
		account_id: &str,
		cursor: Option<&str>,
		limit: usize,
		order: PageOrder,
	) -> Result<Vec<OperationRecord>, HorizonError> {
		let limit = limit.to_string();
		let mut query = vec![
			("order", order.as_str()),
			("limit", limit.as_str()),
			("include_failed", "true"),
			("join", "transactions"),
		];
		if let Some(cursor) = cursor {
			query.push(("cursor", cursor));
		}

		let url = self.operations_url(account_id);
		debug!("Fetching operations page from {} ({:?})", url, query);

		let response = self.http_client.get(&url).query(&query).send().await?;
		let page: Page<serde_json::Value> = Self::read_json(response).await?;
		let records = page.into_operation_records();

		debug!("Received {} operation records", records.len());
		Ok(records)
	}

	/// Map status codes to errors, then decode the body.
	async fn read_json<T: serde::de::DeserializeOwned>(
		response: reqwest::Response,
	) -> Result<T, HorizonError> {
		let status = response.status();
		if status == StatusCode::NOT_FOUND {
			return Err(HorizonError::NotFound);
		}

		let body = response.bytes().await?;
		if !status.is_success() {
			let problem: ProblemRecord = serde_json::from_slice(&body).unwrap_or_default();
			let message = if problem.detail.is_empty() {
				problem.title
			} else {
				problem.detail
			};
			return Err(HorizonError::Status {
				status: status.as_u16(),
				message,
			});
		}

		Ok(serde_json::from_slice(&body)?)
	}
}

#[async_trait]
impl LedgerClient for HorizonClient {
	async fn fetch_account(&self, account_id: &str) -> Result<AccountRecord, HorizonError> {
		let url = format!("{}/accounts/{}", self.horizon_url, account_id);
		debug!("Fetching account from {}", url);

		let response = self.http_client.get(&url).send().await?;
		Self::read_json(response).await
	}

	async fn fetch_operations_after(
		&self,
		account_id: &str,
		cursor: Option<&str>,
		limit: usize,
	) -> Result<Vec<OperationRecord>, HorizonError> {
		self.fetch_operations(account_id, cursor, limit, PageOrder::Asc)
			.await
	}

	async fn fetch_operations_before(
		&self,
		account_id: &str,
		cursor: Option<&str>,
		limit: usize,
	) -> Result<Vec<OperationRecord>, HorizonError> {
		self.fetch_operations(account_id, cursor, limit, PageOrder::Desc)
			.await
	}

	async fn subscribe_operations(&self, account_id: &str) -> Result<OperationStream, HorizonError> {
		let url = self.operations_url(account_id);
		debug!("Opening operations stream to: {}", url);

		let response = self
			.stream_client
			.get(&url)
			.header("Accept", "text/event-stream")
			.query(&[
				("cursor", "now"),
				("include_failed", "true"),
				("join", "transactions"),
			])
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			return Err(HorizonError::Status {
				status: status.as_u16(),
				message: "event stream rejected".to_string(),
			});
		}
		info!("Operations stream established for {}", account_id);

		let mut decoder = SseDecoder::new();
		let stream = response
			.bytes_stream()
			.map(move |chunk| match chunk {
				Ok(bytes) => decoder
					.push(&bytes)
					.into_iter()
					.filter(|event| !event.is_open())
					.map(|event| {
						serde_json::from_str::<OperationRecord>(&event.data).map_err(|e| {
							error!("Failed to deserialize streamed operation: {}", e);
							HorizonError::JsonError(e)
						})
					})
					.collect::<Vec<_>>(),
				Err(e) => vec![Err(HorizonError::HttpError(e))],
			})
			.flat_map(futures_util::stream::iter);

		Ok(Box::pin(stream))
	}
}
