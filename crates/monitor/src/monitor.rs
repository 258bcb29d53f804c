use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use async_channel as chan;
use fm_fs_watcher::{WatchBackend, WatchEvent};
use tracing::{debug, info};

use crate::{
	authority::StorageAuthority,
	bootstrap::BootstrapSummary,
	config::MonitorConfig,
	dispatch::Dispatcher,
	engine::Engine,
	error::AuthorityError,
	listener::EventListener,
	report::StatusReport,
};

/// The running monitor: listener task, sharded workers and the engine they feed
pub struct FileMonitor {
	engine: Arc<Engine>,
	dispatcher: Arc<Dispatcher>,
	listener: EventListener,
}

impl FileMonitor {
	/// Must be called inside a tokio runtime; `events_rx` is the channel the
	/// backend delivers its events to
	pub fn new(
		backend: Arc<dyn WatchBackend>,
		events_rx: chan::Receiver<WatchEvent>,
		authority: Arc<dyn StorageAuthority>,
		config: MonitorConfig,
	) -> Self {
		let workers = config.workers();
		let engine = Arc::new(Engine::new(backend, authority, config));
		let dispatcher = Arc::new(Dispatcher::spawn(Arc::clone(&engine), workers));
		let listener = EventListener::spawn(events_rx, Arc::clone(&dispatcher));

		debug!(workers, "File monitor running");

		Self {
			engine,
			dispatcher,
			listener,
		}
	}

	#[must_use]
	pub fn engine(&self) -> &Engine {
		&self.engine
	}

	/// Register the configured roots and discover below them
	pub async fn bootstrap(&self) -> BootstrapSummary {
		let roots = self.engine.config().roots.clone();
		self.engine.bootstrap(&roots).await
	}

	pub async fn bootstrap_roots(&self, roots: &[PathBuf]) -> BootstrapSummary {
		self.engine.bootstrap(roots).await
	}

	pub async fn start_monitoring(&self) -> Result<BootstrapSummary, AuthorityError> {
		self.engine.start_monitoring().await
	}

	pub async fn add_folder(&self, path: impl AsRef<Path>) -> bool {
		self.engine.add_folder_watch(path.as_ref()).await
	}

	pub async fn add_file(&self, folder: impl AsRef<Path>, name: &str) -> bool {
		self.engine.add_file_watch(folder.as_ref(), name).await
	}

	pub fn commit(&self, path: impl AsRef<Path>) -> bool {
		self.engine.acknowledge_commit(path.as_ref())
	}

	#[must_use]
	pub fn report(&self) -> StatusReport {
		self.engine.report()
	}

	/// Events are dropped until [`Self::resume`]; nothing is replayed afterwards
	pub fn pause(&self) {
		info!("Monitoring paused");
		self.listener.pause();
	}

	pub fn resume(&self) {
		info!("Monitoring resumed");
		self.listener.resume();
	}

	#[must_use]
	pub fn is_paused(&self) -> bool {
		self.listener.is_paused()
	}

	/// Events waiting for a worker
	#[must_use]
	pub fn queued_events(&self) -> usize {
		self.dispatcher.queued()
	}

	/// Stop listening, let the workers drain and release every watch
	pub async fn shutdown(mut self) -> usize {
		self.listener.shutdown().await;
		self.dispatcher.shutdown().await;
		let released = self.engine.shutdown();

		info!(released, "File monitor shutdown");

		released
	}
}
