use tokio::signal;
use tracing::{error, info};

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!(?e, "Failed to listen for Ctrl+C;");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut terminate) => {
				terminate.recv().await;
			}
			Err(e) => {
				error!(?e, "Failed to install SIGTERM handler;");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}

	info!("Shutdown signal received, stopping gracefully...");
}
