//! Linux (and Windows) event handler
//!
//! inotify tags both halves of a rename with the same cookie and notify follows a
//! matched `RenameTo` with a combined two-path rename event. ReadDirectoryChangesW
//! delivers untagged `RenameFrom`/`RenameTo` pairs back to back. Both shapes are
//! paired here; an old half that never meets its partner is reported as deleted.

use std::{
	collections::HashMap,
	path::PathBuf,
	time::{Duration, Instant},
};

use tracing::trace;

use super::{EventHandler, UpdateBuffer, RENAME_PAIRING_TIMEOUT, STABILIZATION_TIMEOUT};
use crate::event::{RawEventKind, RawNotifyEvent, WatchEvent};

/// Linux event handler
#[derive(Debug, Default)]
pub struct LinuxHandler {
	/// Files pending stabilization
	pending_updates: UpdateBuffer,
	/// Old halves of renames keyed by their cookie (`None` for untagged backends)
	pending_renames: HashMap<Option<usize>, (PathBuf, Instant)>,
}

impl LinuxHandler {
	/// Create a new Linux handler
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn evict_renames(&mut self, timeout: Duration) -> Vec<WatchEvent> {
		let mut events = Vec::new();

		self.pending_renames.retain(|_, (path, timestamp)| {
			if timestamp.elapsed() > timeout {
				trace!("Evicting unpaired rename as removal: {}", path.display());
				events.extend(WatchEvent::deleted(&*path));
				false
			} else {
				true
			}
		});

		events
	}
}

impl EventHandler for LinuxHandler {
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
				// Buffer modifications for stabilization
				self.pending_updates.touch(path);
				vec![]
			}
			RawEventKind::RenameFrom => {
				let mut events = self.pending_updates.flush(&path);
				if let Some((stale, _)) = self
					.pending_renames
					.insert(event.tracker, (path, Instant::now()))
				{
					events.extend(WatchEvent::deleted(stale));
				}
				events
			}
			RawEventKind::RenameTo => {
				let paired = self.pending_renames.contains_key(&event.tracker);
				match (event.tracker, paired) {
					// notify follows a matched cookie with the two-path rename event
					(Some(_), true) => vec![],
					(None, true) => self
						.pending_renames
						.remove(&None)
						.map(|(from, _)| WatchEvent::moved(from, path))
						.unwrap_or_default(),
					(_, false) => WatchEvent::added(path).into_iter().collect(),
				}
			}
			RawEventKind::Rename if event.paths.len() >= 2 => {
				self.pending_renames.remove(&event.tracker);
				let from = event.paths[0].clone();
				let to = event.paths[1].clone();
				let mut events = self.pending_updates.flush(&from);
				events.extend(WatchEvent::moved(from, to));
				events
			}
			RawEventKind::Rename => {
				// Direction unknown, settle it by looking at the disk
				let mut events = self.pending_updates.flush(&path);
				if path.exists() {
					events.extend(WatchEvent::added(path));
				} else {
					events.extend(WatchEvent::deleted(path));
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
		events.extend(self.evict_renames(RENAME_PAIRING_TIMEOUT));
		events
	}

	fn reset(&mut self) {
		self.pending_updates.clear();
		self.pending_renames.clear();
	}
}

#[cfg(test)]
mod tests {
	use std::{path::Path, time::SystemTime};

	use super::*;

	fn raw(kind: RawEventKind, paths: &[&str], tracker: Option<usize>) -> RawNotifyEvent {
		RawNotifyEvent {
			kind,
			paths: paths.iter().map(PathBuf::from).collect(),
			tracker,
			timestamp: SystemTime::now(),
		}
	}

	#[test]
	fn test_handler_creation() {
		let handler = LinuxHandler::new();
		assert!(handler.pending_updates.is_empty());
		assert!(handler.pending_renames.is_empty());
	}

	#[test]
	fn test_create_event() {
		let mut handler = LinuxHandler::new();

		let events = handler.process(raw(RawEventKind::Create, &["/test/file.txt"], None));
		assert_eq!(events.len(), 1);
		assert!(events[0].is_added());
		assert_eq!(events[0].dir(), Path::new("/test"));
	}

	#[test]
	fn test_remove_event_discards_pending_update() {
		let mut handler = LinuxHandler::new();

		assert!(handler
			.process(raw(RawEventKind::Modify, &["/test/file.txt"], None))
			.is_empty());

		let events = handler.process(raw(RawEventKind::Remove, &["/test/file.txt"], None));
		assert_eq!(events.len(), 1);
		assert!(events[0].is_deleted());
		assert!(handler.pending_updates.is_empty());
	}

	#[test]
	fn test_inotify_rename_pairing() {
		let mut handler = LinuxHandler::new();

		assert!(handler
			.process(raw(RawEventKind::RenameFrom, &["/test/old.txt"], Some(7)))
			.is_empty());
		assert!(handler
			.process(raw(RawEventKind::RenameTo, &["/test/new.txt"], Some(7)))
			.is_empty());

		let events = handler.process(raw(
			RawEventKind::Rename,
			&["/test/old.txt", "/test/new.txt"],
			Some(7),
		));
		assert_eq!(events.len(), 1);
		assert!(events[0].is_moved());
		assert!(handler.pending_renames.is_empty());
	}

	#[test]
	fn test_untagged_rename_pairing() {
		let mut handler = LinuxHandler::new();

		assert!(handler
			.process(raw(RawEventKind::RenameFrom, &["/test/old.txt"], None))
			.is_empty());

		let events = handler.process(raw(RawEventKind::RenameTo, &["/test/new.txt"], None));
		assert_eq!(
			events,
			vec![WatchEvent::Moved {
				dir: PathBuf::from("/test"),
				old_name: "old.txt".into(),
				new_name: "new.txt".into(),
			}]
		);
	}

	#[test]
	fn test_unmatched_rename_to_is_an_addition() {
		let mut handler = LinuxHandler::new();

		let events = handler.process(raw(RawEventKind::RenameTo, &["/test/in.txt"], Some(3)));
		assert_eq!(events.len(), 1);
		assert!(events[0].is_added());
	}

	#[test]
	fn test_tick_flushes_expired_state() {
		let mut handler = LinuxHandler::new();

		handler.process(raw(RawEventKind::Modify, &["/test/file.txt"], None));
		handler.process(raw(RawEventKind::RenameFrom, &["/test/gone.txt"], Some(1)));

		std::thread::sleep(RENAME_PAIRING_TIMEOUT + Duration::from_millis(50));

		let events = handler.tick();
		assert_eq!(events.len(), 2);
		assert!(events.iter().any(WatchEvent::is_modified));
		assert!(events.iter().any(WatchEvent::is_deleted));
	}

	#[test]
	fn test_reset_drops_everything() {
		let mut handler = LinuxHandler::new();

		handler.process(raw(RawEventKind::Modify, &["/test/file.txt"], None));
		handler.process(raw(RawEventKind::RenameFrom, &["/test/gone.txt"], Some(1)));
		handler.reset();

		assert!(handler.tick().is_empty());
	}
}
