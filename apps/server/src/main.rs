use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use fm_fs_watcher::{NotifyBackend, WatchBackend};
use fm_monitor::{FileMonitor, MemoryAuthority, StorageAuthority};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{api::ServerState, config::ServerConfig};

mod api;
mod config;
mod utils;

#[derive(Debug, Parser)]
#[command(name = "fm-server", version, about = "File monitor administrative server")]
struct Args {
	/// Directory holding `fm-server.json`
	#[arg(long, env = "DATA_DIR")]
	data_dir: Option<PathBuf>,

	/// Overrides the configured port
	#[arg(long, env = "PORT")]
	port: Option<u16>,

	/// Extra folder or file to watch, may be repeated
	#[arg(long = "root")]
	roots: Vec<PathBuf>,

	/// Storage manifest, overrides the configured one
	#[arg(long)]
	manifest: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let data_dir = args.data_dir.unwrap_or_else(config::default_data_dir);
	let mut config = ServerConfig::load_or_create(&data_dir).await?;

	tracing_subscriber::registry()
		.with(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
		)
		.with(fmt::layer())
		.init();

	if let Some(port) = args.port {
		config.port = port;
	}
	config.monitor.roots.extend(args.roots);

	let manifest_path = args
		.manifest
		.or_else(|| config.manifest_path.clone())
		.map(|path| {
			if path.is_relative() {
				data_dir.join(path)
			} else {
				path
			}
		});

	let authority = Arc::new(match &manifest_path {
		Some(path) if path.exists() => MemoryAuthority::load(path)
			.await
			.with_context(|| format!("loading storage manifest {}", path.display()))?,
		_ => MemoryAuthority::new(),
	});

	let (events_tx, events_rx) = async_channel::unbounded();
	let backend = Arc::new(NotifyBackend::new(events_tx)?);

	let monitor = FileMonitor::new(
		Arc::clone(&backend) as Arc<dyn WatchBackend>,
		events_rx,
		Arc::clone(&authority) as Arc<dyn StorageAuthority>,
		config.monitor.clone(),
	);
	monitor.bootstrap().await;

	let state = Arc::new(ServerState {
		monitor,
		authority,
		manifest_path,
	});

	let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
	let listener = TcpListener::bind(addr)
		.await
		.with_context(|| format!("binding {addr}"))?;
	info!("Listening on http://localhost:{}", config.port);

	axum::serve(listener, api::router(Arc::clone(&state)))
		.with_graceful_shutdown(utils::shutdown_signal())
		.await
		.context("serving the admin API")?;

	match Arc::try_unwrap(state) {
		Ok(state) => {
			state.monitor.shutdown().await;
		}
		Err(_) => warn!("Server state is still shared, skipping monitor shutdown"),
	}
	backend.shutdown().await;

	Ok(())
}
