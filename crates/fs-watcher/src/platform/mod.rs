//! Per-platform translation of notify events into [`WatchEvent`]s
//!
//! Handlers keep a little state between events: modify bursts are buffered until
//! the file stabilizes and the halves of a rename are paired before a `Moved` is
//! emitted. The owner must call [`EventHandler::tick`] periodically so buffered
//! state is flushed.

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	time::{Duration, Instant},
};

use tracing::trace;

use crate::event::{RawNotifyEvent, WatchEvent};

// inotify and ReadDirectoryChangesW both report the two halves of a rename
#[cfg(not(target_os = "macos"))]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(not(target_os = "macos"))]
pub use linux::LinuxHandler as DefaultHandler;

#[cfg(target_os = "macos")]
pub use macos::MacOsHandler as DefaultHandler;

/// Timeout for modify bursts to settle
pub const STABILIZATION_TIMEOUT: Duration = Duration::from_millis(100);

/// How long the old half of a rename waits for its partner before it is
/// reported as a deletion (the entry left the watched area)
pub const RENAME_PAIRING_TIMEOUT: Duration = Duration::from_millis(500);

pub trait EventHandler: Send + 'static {
	/// Translate one raw event, possibly emitting buffered events first
	fn process(&mut self, event: RawNotifyEvent) -> Vec<WatchEvent>;

	/// Flush whatever buffered state has expired
	fn tick(&mut self) -> Vec<WatchEvent>;

	/// Drop all buffered state
	fn reset(&mut self);
}

/// Modify events waiting for their file to stabilize
#[derive(Debug, Default)]
pub(crate) struct UpdateBuffer {
	pending: HashMap<PathBuf, Instant>,
}

impl UpdateBuffer {
	pub(crate) fn touch(&mut self, path: PathBuf) {
		self.pending.insert(path, Instant::now());
	}

	/// Emit the pending update for `path` right away, so it is not reordered
	/// after a later event on the same path
	pub(crate) fn flush(&mut self, path: &Path) -> Vec<WatchEvent> {
		self.pending
			.remove(path)
			.and_then(|_| WatchEvent::modified(path))
			.into_iter()
			.collect()
	}

	pub(crate) fn discard(&mut self, path: &Path) {
		self.pending.remove(path);
	}

	pub(crate) fn evict(&mut self, timeout: Duration) -> Vec<WatchEvent> {
		let mut events = Vec::new();

		self.pending.retain(|path, timestamp| {
			if timestamp.elapsed() > timeout {
				trace!("Evicting update (stabilized): {}", path.display());
				events.extend(WatchEvent::modified(path));
				false
			} else {
				true
			}
		});

		events
	}

	#[cfg(test)]
	pub(crate) fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}

	pub(crate) fn clear(&mut self) {
		self.pending.clear();
	}
}
