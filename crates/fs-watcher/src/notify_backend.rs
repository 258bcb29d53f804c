use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	pin::pin,
	sync::atomic::{AtomicU64, Ordering},
	time::Duration,
};

use async_channel as chan;
use futures::StreamExt;
use futures_concurrency::stream::Merge;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::{
	spawn,
	task::JoinHandle,
	time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, instrument, trace, warn};

use crate::{
	backend::{WatchBackend, WatchHandle},
	error::WatchError,
	event::{RawNotifyEvent, WatchEvent},
	platform::{DefaultHandler, EventHandler},
};

const HUNDRED_MILLIS: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct InstalledWatch {
	path: PathBuf,
	mode: RecursiveMode,
}

/// [`WatchBackend`] on top of notify's recommended watcher.
///
/// notify invokes its callback on its own thread; the callback only pushes the
/// raw event into an unbounded channel. A tokio task runs the platform handler
/// over that channel and forwards the resulting [`WatchEvent`]s to the consumer.
/// Must be created inside a tokio runtime.
pub struct NotifyBackend {
	watcher: Mutex<RecommendedWatcher>,
	watches: Mutex<HashMap<WatchHandle, InstalledWatch>>,
	next_handle: AtomicU64,
	handle: Mutex<Option<JoinHandle<()>>>,
	stop_tx: chan::Sender<()>,
}

impl NotifyBackend {
	pub fn new(events_tx: chan::Sender<WatchEvent>) -> Result<Self, WatchError> {
		let (raw_tx, raw_rx) = chan::unbounded::<notify::Result<notify::Event>>();
		let (stop_tx, stop_rx) = chan::bounded(1);

		let watcher = RecommendedWatcher::new(
			move |result| {
				if raw_tx.is_closed() {
					error!("Tried to send file system events to a closed channel;");
				} else if raw_tx.send_blocking(result).is_err() {
					// Never blocks, the channel is unbounded
					error!("Unable to send watcher event to the translation task;");
				}
			},
			Config::default(),
		)
		.map_err(|e| WatchError::from_notify(PathBuf::new(), e))?;

		let handle = spawn(async move {
			while let Err(e) = spawn(Self::translate_events(
				raw_rx.clone(),
				events_tx.clone(),
				stop_rx.clone(),
			))
			.await
			{
				if e.is_panic() {
					error!(?e, "Watch event translation panicked;");
				} else {
					trace!("Watch event translation received shutdown signal and will exit...");
					break;
				}
				trace!("Restarting watch event translation task...");
			}

			debug!("Watch event translation gracefully shutdown");
		});

		Ok(Self {
			watcher: Mutex::new(watcher),
			watches: Mutex::new(HashMap::new()),
			next_handle: AtomicU64::new(1),
			handle: Mutex::new(Some(handle)),
			stop_tx,
		})
	}

	async fn translate_events(
		raw_rx: chan::Receiver<notify::Result<notify::Event>>,
		events_tx: chan::Sender<WatchEvent>,
		stop_rx: chan::Receiver<()>,
	) {
		enum StreamMessage {
			NewEvent(notify::Result<notify::Event>),
			Tick,
			Stop,
		}

		let mut handler = DefaultHandler::new();

		let mut handler_tick_interval =
			interval_at(Instant::now() + HUNDRED_MILLIS, HUNDRED_MILLIS);
		// In case of doubt check: https://docs.rs/tokio/latest/tokio/time/enum.MissedTickBehavior.html
		handler_tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let mut msg_stream = pin!((
			raw_rx.map(StreamMessage::NewEvent),
			IntervalStream::new(handler_tick_interval).map(|_| StreamMessage::Tick),
			stop_rx.map(|()| StreamMessage::Stop),
		)
			.merge());

		while let Some(msg) = msg_stream.next().await {
			let events = match msg {
				StreamMessage::NewEvent(Ok(event)) => {
					handler.process(RawNotifyEvent::from_notify(event))
				}
				StreamMessage::NewEvent(Err(e)) => {
					error!(?e, "Watcher error;");
					continue;
				}
				StreamMessage::Tick => handler.tick(),
				StreamMessage::Stop => {
					debug!("Stopping watch event translation");
					break;
				}
			};

			for event in events {
				if events_tx.send(event).await.is_err() {
					warn!("Watch event consumer is gone, stopping translation");
					return;
				}
			}
		}
	}

	/// Paths currently watched, for diagnostics
	pub fn watched_paths(&self) -> Vec<(WatchHandle, PathBuf)> {
		self.watches
			.lock()
			.iter()
			.map(|(handle, watch)| (*handle, watch.path.clone()))
			.collect()
	}

	/// Remove every watch and wait for the translation task to finish
	pub async fn shutdown(&self) {
		let handles = self.watches.lock().keys().copied().collect::<Vec<_>>();
		for handle in handles {
			self.remove_watch(handle);
		}

		if self.stop_tx.send(()).await.is_err() {
			trace!("Watch event translation already stopped");
		}

		let maybe_handle = self.handle.lock().take();
		if let Some(handle) = maybe_handle {
			if let Err(e) = handle.await {
				error!(?e, "Failed to join watch event translation task;");
			}
		}
	}

	fn unwatch(&self, path: &Path) {
		if let Err(e) = self.watcher.lock().unwatch(path) {
			// The OS drops the watch on its own when the directory is deleted
			if matches!(e.kind, notify::ErrorKind::WatchNotFound) {
				trace!(path = %path.display(), "Watch was already gone");
			} else {
				error!(?e, path = %path.display(), "Unable to unwatch path;");
			}
		}
	}
}

impl WatchBackend for NotifyBackend {
	#[instrument(skip(self, path), fields(path = %path.display()), err)]
	fn install_watch(&self, path: &Path, recursive: bool) -> Result<WatchHandle, WatchError> {
		let mode = if recursive {
			RecursiveMode::Recursive
		} else {
			RecursiveMode::NonRecursive
		};

		self.watcher
			.lock()
			.watch(path, mode)
			.map_err(|e| WatchError::from_notify(path, e))?;

		let handle = WatchHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
		self.watches.lock().insert(
			handle,
			InstalledWatch {
				path: path.to_path_buf(),
				mode,
			},
		);

		trace!(%handle, "Now watching");

		Ok(handle)
	}

	fn remove_watch(&self, handle: WatchHandle) {
		let (removed, still_shared) = {
			let mut watches = self.watches.lock();
			let removed = watches.remove(&handle);
			let still_shared = removed
				.as_ref()
				.is_some_and(|gone| watches.values().any(|watch| watch.path == gone.path));
			(removed, still_shared)
		};

		match removed {
			Some(watch) if !still_shared => {
				self.unwatch(&watch.path);
				trace!(%handle, path = %watch.path.display(), "Stop watching");
			}
			Some(_) => trace!(%handle, "Path still watched by another handle"),
			None => trace!(%handle, "Tried to remove an unknown watch"),
		}
	}

	fn relocate_watch(&self, handle: WatchHandle, new_path: &Path) -> Result<(), WatchError> {
		let watch = self
			.watches
			.lock()
			.get(&handle)
			.cloned()
			.ok_or(WatchError::UnknownHandle(handle))?;

		self.unwatch(&watch.path);

		self.watcher
			.lock()
			.watch(new_path, watch.mode)
			.map_err(|e| WatchError::from_notify(new_path, e))?;

		if let Some(installed) = self.watches.lock().get_mut(&handle) {
			installed.path = new_path.to_path_buf();
		}

		trace!(%handle, from = %watch.path.display(), to = %new_path.display(), "Relocated watch");

		Ok(())
	}
}

impl Drop for NotifyBackend {
	fn drop(&mut self) {
		if self.handle.get_mut().take().is_some() && self.stop_tx.try_send(()).is_err() {
			trace!("Watch event translation already stopped");
		}
	}
}
