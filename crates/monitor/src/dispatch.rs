//! Sharded event dispatcher
//!
//! One worker per shard, each draining its own channel. Events are routed by a
//! hash of the outermost tracked folder above their directory, so a whole
//! watched tree is applied by one worker in delivery order: a folder rename and
//! the events that follow inside the renamed folder can never overtake each
//! other. Unrelated trees proceed in parallel.

use std::{
	collections::hash_map::DefaultHasher,
	hash::{Hash, Hasher},
	path::{Path, PathBuf},
	sync::Arc,
};

use async_channel as chan;
use parking_lot::Mutex;
use tokio::{spawn, task::JoinHandle};
use tracing::{debug, error, trace, warn};

use crate::{engine::Engine, listener::FsEvent};

#[derive(Debug)]
pub struct Dispatcher {
	engine: Arc<Engine>,
	shards: Vec<chan::Sender<FsEvent>>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
	pub fn spawn(engine: Arc<Engine>, workers: usize) -> Self {
		let (shards, handles) = (0..workers.max(1))
			.map(|shard| {
				let (events_tx, events_rx) = chan::unbounded();
				let engine = Arc::clone(&engine);

				let handle = spawn(async move {
					while let Err(e) =
						spawn(Self::run_shard(shard, events_rx.clone(), Arc::clone(&engine))).await
					{
						if e.is_panic() {
							error!(?e, shard, "Event worker panicked;");
						} else {
							break;
						}
						trace!(shard, "Restarting event worker...");
					}

					debug!(shard, "Event worker gracefully shutdown");
				});

				(events_tx, handle)
			})
			.unzip::<_, _, Vec<_>, Vec<_>>();

		Self {
			engine,
			shards,
			handles: Mutex::new(handles),
		}
	}

	async fn run_shard(shard: usize, events_rx: chan::Receiver<FsEvent>, engine: Arc<Engine>) {
		while let Ok(event) = events_rx.recv().await {
			trace!(shard, ?event, "Handling event");
			engine.handle(event).await;
		}
	}

	/// Events below the same tracked tree share a key; directories outside any
	/// tracked folder are their own key
	#[must_use]
	pub fn routing_key(&self, event: &FsEvent) -> PathBuf {
		let dir = event.dir();
		self.engine
			.store()
			.outermost_tracked(dir)
			.unwrap_or_else(|| dir.to_path_buf())
	}

	#[must_use]
	pub fn shard_for(&self, key: &Path) -> usize {
		let mut hasher = DefaultHasher::new();
		key.hash(&mut hasher);
		let shard = hasher.finish() % self.shards.len() as u64;
		usize::try_from(shard).unwrap_or_default()
	}

	pub fn dispatch(&self, event: FsEvent) {
		let shard = self.shard_for(&self.routing_key(&event));

		if let Err(e) = self.shards[shard].try_send(event) {
			warn!(shard, event = ?e.into_inner(), "Event worker is gone, dropping event;");
		}
	}

	/// Events queued and not yet picked up by a worker
	#[must_use]
	pub fn queued(&self) -> usize {
		self.shards.iter().map(chan::Sender::len).sum()
	}

	/// Let every worker drain its queue and wait for all of them
	pub async fn shutdown(&self) {
		for events_tx in &self.shards {
			events_tx.close();
		}

		let handles = std::mem::take(&mut *self.handles.lock());
		for handle in handles {
			if let Err(e) = handle.await {
				error!(?e, "Failed to join event worker;");
			}
		}
	}
}
