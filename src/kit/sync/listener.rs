//! Update listener.
//!
//! Keeps a push subscription to the account's operation feed open for as long as the listener
//! runs. Every delivered operation raises the change signal; so does every disconnect, since
//! changes may have been missed while the stream was down. The subscription is re-established
//! after any failure without limit: the first attempt is immediate and consecutive failures
//! wait according to an exponential backoff capped by [`ReconnectConfig::max_delay`].

use super::events::{ChangeNotifier, UpdateEvent};
use crate::horizon::LedgerClient;
use crate::kit::config::ReconnectConfig;

use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct UpdateListener {
	client: Arc<dyn LedgerClient>,
	account_id: String,
	notifier: ChangeNotifier,
	reconnect: ReconnectConfig,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateListener {
	pub fn new(
		client: Arc<dyn LedgerClient>,
		account_id: impl Into<String>,
		notifier: ChangeNotifier,
		reconnect: ReconnectConfig,
	) -> Self {
		Self {
			client,
			account_id: account_id.into(),
			notifier,
			reconnect,
			handle: Mutex::new(None),
		}
	}

	fn handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
		self.handle.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Start listening. Does nothing if already running.
	///
	/// Must be called from within a Tokio runtime.
	pub fn start(&self) {
		let mut handle = self.handle();
		if handle.as_ref().is_some_and(|h| !h.is_finished()) {
			debug!("Update listener already running");
			return;
		}

		info!("Starting update listener for {}", self.account_id);
		*handle = Some(tokio::spawn(listen(
			self.client.clone(),
			self.account_id.clone(),
			self.notifier.clone(),
			self.reconnect.clone(),
		)));
	}

	/// Stop listening and release the subscription. Safe to call at any time.
	pub fn stop(&self) {
		if let Some(handle) = self.handle().take() {
			handle.abort();
			info!("Stopped update listener for {}", self.account_id);
		}
	}

	pub fn is_running(&self) -> bool {
		self.handle().as_ref().is_some_and(|h| !h.is_finished())
	}
}

impl Drop for UpdateListener {
	fn drop(&mut self) {
		self.stop();
	}
}

fn reconnect_backoff(config: &ReconnectConfig) -> ExponentialBackoff {
	ExponentialBackoffBuilder::new()
		.with_initial_interval(config.initial_delay)
		.with_max_interval(config.max_delay)
		.with_multiplier(config.multiplier)
		.with_max_elapsed_time(None)
		.build()
}

async fn listen(
	client: Arc<dyn LedgerClient>,
	account_id: String,
	notifier: ChangeNotifier,
	reconnect: ReconnectConfig,
) {
	let mut backoff = reconnect_backoff(&reconnect);
	let mut consecutive_failures: u32 = 0;

	loop {
		let disconnect = match client.subscribe_operations(&account_id).await {
			Ok(mut stream) => {
				debug!("Subscribed to operation stream of {}", account_id);
				loop {
					match stream.next().await {
						Some(Ok(record)) => {
							consecutive_failures = 0;
							backoff.reset();
							notifier.notify(&UpdateEvent::OperationReceived { id: record.id });
						}
						Some(Err(e)) => break UpdateEvent::StreamFailed(e.to_string()),
						None => break UpdateEvent::StreamClosed,
					}
				}
			}
			Err(e) => UpdateEvent::StreamFailed(e.to_string()),
		};

		notifier.notify(&disconnect);
		consecutive_failures = consecutive_failures.saturating_add(1);

		if consecutive_failures > 1 {
			let delay = backoff.next_backoff().unwrap_or(reconnect.max_delay);
			warn!(
				"Update stream lost ({:?}), reconnecting in {:?}",
				disconnect, delay
			);
			tokio::time::sleep(delay).await;
		} else {
			warn!("Update stream lost ({:?}), reconnecting", disconnect);
		}
	}
}
