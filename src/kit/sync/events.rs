//! Change signal shared by the update listener and the coordinator.
//!
//! The listener turns every event of the remote push stream into an [`UpdateEvent`] and raises
//! a single "something changed" signal for it. The signal is carried by a channel with a
//! capacity of one: raising it while a signal is already pending is a no-op, so any burst of
//! remote events collapses into one resync. The coordinator's reaction (sync everything from
//! the stored cursors) is idempotent, which is what makes dropping the extra signals safe.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// What the listener observed on the push stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
	/// A new operation touching the account was announced
	OperationReceived { id: String },
	/// The remote side closed the stream
	StreamClosed,
	/// The subscription failed or delivered a broken event
	StreamFailed(String),
	/// A consumer asked for a sync cycle
	Refresh,
}

/// Create a connected notifier/receiver pair.
pub fn change_channel() -> (ChangeNotifier, ChangeReceiver) {
	let (tx, rx) = mpsc::channel(1);
	(ChangeNotifier { tx }, ChangeReceiver { rx })
}

/// Sending half of the change signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
	tx: mpsc::Sender<()>,
}

impl ChangeNotifier {
	/// Raise the change signal for `event`.
	///
	/// Returns `false` when the signal was already pending (coalesced) or nobody listens anymore.
	pub fn notify(&self, event: &UpdateEvent) -> bool {
		match self.tx.try_send(()) {
			Ok(()) => {
				debug!("Change signal raised by {:?}", event);
				true
			}
			Err(TrySendError::Full(())) => {
				debug!("Change signal already pending, coalescing {:?}", event);
				false
			}
			Err(TrySendError::Closed(())) => false,
		}
	}
}

/// Receiving half of the change signal, owned by the coordinator.
#[derive(Debug)]
pub struct ChangeReceiver {
	rx: mpsc::Receiver<()>,
}

impl ChangeReceiver {
	/// Wait for the next signal. Returns `None` once every notifier is gone.
	pub async fn changed(&mut self) -> Option<()> {
		self.rx.recv().await
	}
}
