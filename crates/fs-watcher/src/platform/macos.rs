//! macOS-specific event handler
//!
//! FSEvents reports each half of a rename as a separate single-path event with
//! no cookie. The half whose path no longer exists is the old name; it waits for
//! the next rename that does exist on disk.

use std::{path::PathBuf, time::Instant};

use tracing::trace;

use super::{EventHandler, UpdateBuffer, RENAME_PAIRING_TIMEOUT, STABILIZATION_TIMEOUT};
use crate::event::{RawEventKind, RawNotifyEvent, WatchEvent};

#[derive(Debug, Default)]
pub struct MacOsHandler {
	pending_updates: UpdateBuffer,
	pending_rename: Option<(PathBuf, Instant)>,
}

impl MacOsHandler {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

impl EventHandler for MacOsHandler {
	fn process(&mut self, event: RawNotifyEvent) -> Vec<WatchEvent> {
		let Some(path) = event.primary_path().cloned() else {
			return vec![];
		};

		match event.kind {
			RawEventKind::Create => {
				let mut events = self.pending_updates.flush(&path);
				events.extend(WatchEvent::added(path));
				events
			}
			RawEventKind::Remove => {
				self.pending_updates.discard(&path);
				WatchEvent::deleted(path).into_iter().collect()
			}
			RawEventKind::Modify => {
				self.pending_updates.touch(path);
				vec![]
			}
			RawEventKind::Rename | RawEventKind::RenameFrom | RawEventKind::RenameTo => {
				let mut events = self.pending_updates.flush(&path);

				if path.exists() {
					match self.pending_rename.take() {
						Some((from, _)) => events.extend(WatchEvent::moved(from, path)),
						None => events.extend(WatchEvent::added(path)),
					}
				} else if let Some((stale, _)) = self.pending_rename.replace((path, Instant::now())) {
					events.extend(WatchEvent::deleted(stale));
				}

				events
			}
			RawEventKind::Other(ref kind) => {
				trace!("Ignoring unknown event kind: {}", kind);
				vec![]
			}
		}
	}

	fn tick(&mut self) -> Vec<WatchEvent> {
		let mut events = self.pending_updates.evict(STABILIZATION_TIMEOUT);

		if self
			.pending_rename
			.as_ref()
			.is_some_and(|(_, at)| at.elapsed() > RENAME_PAIRING_TIMEOUT)
		{
			if let Some((path, _)) = self.pending_rename.take() {
				events.extend(WatchEvent::deleted(path));
			}
		}

		events
	}

	fn reset(&mut self) {
		self.pending_updates.clear();
		self.pending_rename = None;
	}
}
