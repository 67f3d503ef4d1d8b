use futures::StreamExt;
use stellar_state_sync::{KitConfig, StellarAsset, StellarKit, TagQuery};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let config = match KitConfig::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			return;
		}
	};

	let account_id = match std::env::var("STELLAR_ACCOUNT_ID") {
		Ok(account_id) => account_id,
		Err(_) => {
			error!("STELLAR_ACCOUNT_ID must be set");
			return;
		}
	};

	info!("Starting account mirror for {} on {}", account_id, config.network);

	let kit = match StellarKit::open(account_id, config) {
		Ok(kit) => kit,
		Err(e) => {
			error!("Failed to open kit: {}", e);
			return;
		}
	};

	let mut native = Box::pin(kit.balance_changes(StellarAsset::Native));
	let mut operations = Box::pin(kit.operation_changes());

	kit.start();

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				info!("Shutting down");
				break;
			}
			Some(balance) = native.next() => match balance {
				Some(balance) => info!(
					"Native balance: {} (available {})",
					balance.balance,
					balance.available()
				),
				None => info!("Account holds no native balance yet"),
			},
			Some(()) = operations.next() => match kit.operations(TagQuery::new(), None, Some(5)) {
				Ok(recent) => {
					for operation in recent {
						info!(
							"Operation {} {} at {}",
							operation.id, operation.operation_type, operation.timestamp
						);
					}
				}
				Err(e) => error!("Failed to read operations: {}", e),
			},
		}
	}

	kit.stop();
}
