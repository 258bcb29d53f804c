//! Event listener adapter
//!
//! Drains the watch backend channel, drops events while paused and hands
//! canonical [`FsEvent`]s to the dispatcher.

use std::{
	path::{Path, PathBuf},
	pin::pin,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use async_channel as chan;
use fm_fs_watcher::WatchEvent;
use futures::StreamExt;
use futures_concurrency::stream::Merge;
use tokio::{spawn, task::JoinHandle};
use tracing::{debug, error, trace, warn};

use crate::{dispatch::Dispatcher, error::NonUtf8PathError, path::normalize};

/// Watch event with `dir` and names joined into full paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
	Added(PathBuf),
	Deleted(PathBuf),
	Modified(PathBuf),
	Moved { from: PathBuf, to: PathBuf },
}

impl FsEvent {
	/// Directory the event happened in
	#[must_use]
	pub fn dir(&self) -> &Path {
		let path = match self {
			Self::Added(path) | Self::Deleted(path) | Self::Modified(path) => path,
			Self::Moved { from, .. } => from,
		};
		path.parent().unwrap_or(path)
	}
}

impl TryFrom<WatchEvent> for FsEvent {
	type Error = NonUtf8PathError;

	fn try_from(event: WatchEvent) -> Result<Self, Self::Error> {
		fn join(dir: &Path, name: &std::ffi::OsStr) -> Result<PathBuf, NonUtf8PathError> {
			let path = normalize(dir).join(name);
			if name.to_str().is_none() {
				return Err(NonUtf8PathError(path.into()));
			}
			Ok(path)
		}

		Ok(match event {
			WatchEvent::Added { dir, name } => Self::Added(join(&dir, &name)?),
			WatchEvent::Deleted { dir, name } => Self::Deleted(join(&dir, &name)?),
			WatchEvent::Modified { dir, name } => Self::Modified(join(&dir, &name)?),
			WatchEvent::Moved {
				dir,
				old_name,
				new_name,
			} => Self::Moved {
				from: join(&dir, &old_name)?,
				to: join(&dir, &new_name)?,
			},
		})
	}
}

/// Listener task plus the global pause toggle
#[derive(Debug)]
pub struct EventListener {
	paused: Arc<AtomicBool>,
	handle: Option<JoinHandle<()>>,
	stop_tx: chan::Sender<()>,
}

impl EventListener {
	pub fn spawn(events_rx: chan::Receiver<WatchEvent>, dispatcher: Arc<Dispatcher>) -> Self {
		let paused = Arc::new(AtomicBool::new(false));
		let (stop_tx, stop_rx) = chan::bounded(1);

		let handle = spawn({
			let paused = Arc::clone(&paused);
			async move {
				while let Err(e) = spawn(Self::run(
					events_rx.clone(),
					stop_rx.clone(),
					Arc::clone(&paused),
					Arc::clone(&dispatcher),
				))
				.await
				{
					if e.is_panic() {
						error!(?e, "Event listener panicked;");
					} else {
						break;
					}
					trace!("Restarting event listener...");
				}

				debug!("Event listener gracefully shutdown");
			}
		});

		Self {
			paused,
			handle: Some(handle),
			stop_tx,
		}
	}

	async fn run(
		events_rx: chan::Receiver<WatchEvent>,
		stop_rx: chan::Receiver<()>,
		paused: Arc<AtomicBool>,
		dispatcher: Arc<Dispatcher>,
	) {
		enum StreamMessage {
			NewEvent(WatchEvent),
			Stop,
		}

		let mut msg_stream = pin!((
			events_rx.map(StreamMessage::NewEvent),
			stop_rx.map(|()| StreamMessage::Stop),
		)
			.merge());

		while let Some(msg) = msg_stream.next().await {
			match msg {
				StreamMessage::NewEvent(event) => {
					if paused.load(Ordering::Acquire) {
						trace!(?event, "Monitoring paused, dropping event");
						continue;
					}

					match FsEvent::try_from(event) {
						Ok(event) => dispatcher.dispatch(event),
						Err(e) => warn!(?e, "Dropping event;"),
					}
				}
				StreamMessage::Stop => {
					debug!("Stopping event listener");
					break;
				}
			}
		}
	}

	pub fn pause(&self) {
		self.paused.store(true, Ordering::Release);
	}

	pub fn resume(&self) {
		self.paused.store(false, Ordering::Release);
	}

	#[must_use]
	pub fn is_paused(&self) -> bool {
		self.paused.load(Ordering::Acquire)
	}

	pub async fn shutdown(&mut self) {
		if self.stop_tx.send(()).await.is_err() {
			trace!("Event listener already stopped");
		}

		if let Some(handle) = self.handle.take() {
			if let Err(e) = handle.await {
				error!(?e, "Failed to join event listener task;");
			}
		}
	}
}
