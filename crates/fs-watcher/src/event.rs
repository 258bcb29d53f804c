//! Event types flowing out of the watch backend

use std::{
	ffi::{OsStr, OsString},
	path::{Path, PathBuf},
	time::SystemTime,
};

use notify::{
	event::{AccessKind, AccessMode, ModifyKind, RenameMode},
	EventKind,
};
use serde::{Deserialize, Serialize};

/// Canonical event handed to consumers.
///
/// Every variant carries the directory the change happened in plus the entry
/// name(s); joining them is left to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchEvent {
	Added { dir: PathBuf, name: OsString },
	Deleted { dir: PathBuf, name: OsString },
	Modified { dir: PathBuf, name: OsString },
	Moved {
		dir: PathBuf,
		old_name: OsString,
		new_name: OsString,
	},
}

impl WatchEvent {
	pub fn added(path: impl AsRef<Path>) -> Option<Self> {
		split(path.as_ref()).map(|(dir, name)| Self::Added { dir, name })
	}

	pub fn deleted(path: impl AsRef<Path>) -> Option<Self> {
		split(path.as_ref()).map(|(dir, name)| Self::Deleted { dir, name })
	}

	pub fn modified(path: impl AsRef<Path>) -> Option<Self> {
		split(path.as_ref()).map(|(dir, name)| Self::Modified { dir, name })
	}

	/// A rename inside one directory becomes a single `Moved`; a move across
	/// directories is reported as a `Deleted` in the source followed by an `Added`
	/// in the destination.
	pub fn moved(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Vec<Self> {
		let (from, to) = (from.as_ref(), to.as_ref());

		match (split(from), split(to)) {
			(Some((from_dir, old_name)), Some((to_dir, new_name))) if from_dir == to_dir => {
				vec![Self::Moved {
					dir: from_dir,
					old_name,
					new_name,
				}]
			}
			(from, to) => from
				.map(|(dir, name)| Self::Deleted { dir, name })
				.into_iter()
				.chain(to.map(|(dir, name)| Self::Added { dir, name }))
				.collect(),
		}
	}

	#[must_use]
	pub fn dir(&self) -> &Path {
		match self {
			Self::Added { dir, .. }
			| Self::Deleted { dir, .. }
			| Self::Modified { dir, .. }
			| Self::Moved { dir, .. } => dir,
		}
	}

	#[must_use]
	pub fn name(&self) -> &OsStr {
		match self {
			Self::Added { name, .. } | Self::Deleted { name, .. } | Self::Modified { name, .. } => {
				name
			}
			Self::Moved { new_name, .. } => new_name,
		}
	}

	#[must_use]
	pub const fn is_added(&self) -> bool {
		matches!(self, Self::Added { .. })
	}

	#[must_use]
	pub const fn is_deleted(&self) -> bool {
		matches!(self, Self::Deleted { .. })
	}

	#[must_use]
	pub const fn is_modified(&self) -> bool {
		matches!(self, Self::Modified { .. })
	}

	#[must_use]
	pub const fn is_moved(&self) -> bool {
		matches!(self, Self::Moved { .. })
	}
}

fn split(path: &Path) -> Option<(PathBuf, OsString)> {
	Some((path.parent()?.to_path_buf(), path.file_name()?.to_os_string()))
}

/// Notify event reduced to what the platform handlers care about
#[derive(Debug, Clone)]
pub struct RawNotifyEvent {
	pub kind: RawEventKind,
	pub paths: Vec<PathBuf>,
	/// Rename cookie, set by backends able to pair both halves of a rename
	pub tracker: Option<usize>,
	pub timestamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEventKind {
	Create,
	Remove,
	Modify,
	/// Old half of a rename
	RenameFrom,
	/// New half of a rename
	RenameTo,
	/// Rename with both paths, or a single-path rename whose direction is unknown
	Rename,
	Other(String),
}

impl RawNotifyEvent {
	#[must_use]
	pub fn from_notify(event: notify::Event) -> Self {
		let kind = match &event.kind {
			EventKind::Create(_) => RawEventKind::Create,
			EventKind::Remove(_) => RawEventKind::Remove,
			EventKind::Modify(ModifyKind::Name(RenameMode::From)) => RawEventKind::RenameFrom,
			EventKind::Modify(ModifyKind::Name(RenameMode::To)) => RawEventKind::RenameTo,
			EventKind::Modify(ModifyKind::Name(_)) => RawEventKind::Rename,
			EventKind::Modify(_) | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
				RawEventKind::Modify
			}
			other => RawEventKind::Other(format!("{other:?}")),
		};

		Self {
			kind,
			tracker: event.tracker(),
			paths: event.paths,
			timestamp: SystemTime::now(),
		}
	}

	#[must_use]
	pub fn primary_path(&self) -> Option<&PathBuf> {
		self.paths.first()
	}
}
