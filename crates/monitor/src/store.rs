//! In-memory status store
//!
//! Folders are keyed by normalized path, files by `(parent folder, name)`. Every
//! operation takes the lock once and keeps it for the whole check-then-act, so
//! concurrent event handlers never interleave on the same key.

use std::{
	collections::{BTreeMap, BTreeSet, HashMap},
	path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use fm_fs_watcher::WatchHandle;
use parking_lot::RwLock;
use tracing::trace;

use crate::{
	error::{ErrorContext, MonitoringError},
	path::normalize,
	status::{ItemKind, ItemStatus},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
	pub status: ItemStatus,
	pub watch_handle: Option<WatchHandle>,
	/// First path of the current rename episode
	pub previous_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
	pub status: ItemStatus,
	/// First name of the current rename episode
	pub previous_name: Option<String>,
	pub observation: Option<Observation>,
}

impl FolderEntry {
	/// Write-once per episode
	fn remember_previous_path(&mut self, previous: &Path) -> bool {
		if self.previous_path.is_some() {
			return false;
		}
		self.previous_path = Some(normalize(previous));
		true
	}
}

impl FileEntry {
	/// Write-once per episode
	fn remember_previous_name(&mut self, previous: &str) -> bool {
		if self.previous_name.is_some() {
			return false;
		}
		self.previous_name = Some(previous.to_string());
		true
	}
}

/// What a file looked like the last time a modify event was evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
	pub size: u64,
	pub modified: DateTime<Utc>,
	pub hash: Option<String>,
}

/// Result of a delete on a tracked item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
	/// The item was never committed and is gone from the store
	Purged,
	/// The item is kept with the `Deleted` status
	MarkedDeleted,
}

/// Point-in-time copy of the whole store, sorted for reporting
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
	pub folders: BTreeMap<PathBuf, FolderEntry>,
	pub files: BTreeMap<PathBuf, BTreeMap<String, FileEntry>>,
	pub missing: BTreeSet<PathBuf>,
	pub errors: Vec<MonitoringError>,
}

#[derive(Debug, Default)]
struct Inner {
	folders: HashMap<PathBuf, FolderEntry>,
	files: HashMap<PathBuf, HashMap<String, FileEntry>>,
	missing: BTreeSet<PathBuf>,
	errors: Vec<MonitoringError>,
}

impl Inner {
	fn file_mut(&mut self, folder: &Path, name: &str) -> Option<&mut FileEntry> {
		self.files.get_mut(folder)?.get_mut(name)
	}

	fn file(&self, folder: &Path, name: &str) -> Option<&FileEntry> {
		self.files.get(folder)?.get(name)
	}

	fn descendants_of(&self, path: &Path) -> Vec<PathBuf> {
		self.folders
			.keys()
			.filter(|folder| folder.as_path() != path && folder.starts_with(path))
			.cloned()
			.collect()
	}
}

#[derive(Debug, Default)]
pub struct StatusStore {
	inner: RwLock<Inner>,
}

impl StatusStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn folder_exists(&self, path: impl AsRef<Path>) -> bool {
		self.inner
			.read()
			.folders
			.contains_key(&normalize(path))
	}

	pub fn file_exists(&self, folder: impl AsRef<Path>, name: &str) -> bool {
		self.inner.read().file(&normalize(folder), name).is_some()
	}

	/// Returns `false` if the folder is already tracked
	pub fn add_folder(&self, path: impl AsRef<Path>, status: ItemStatus) -> bool {
		let path = normalize(path);
		let mut inner = self.inner.write();

		if inner.folders.contains_key(&path) {
			return false;
		}

		trace!(path = %path.display(), %status, "Tracking folder");
		inner.folders.insert(
			path,
			FolderEntry {
				status,
				watch_handle: None,
				previous_path: None,
			},
		);
		true
	}

	/// Returns `false` if the file is already tracked or its folder is not
	pub fn add_file(&self, folder: impl AsRef<Path>, name: &str, status: ItemStatus) -> bool {
		let folder = normalize(folder);
		let mut inner = self.inner.write();

		if !inner.folders.contains_key(&folder) || inner.file(&folder, name).is_some() {
			return false;
		}

		trace!(folder = %folder.display(), name, %status, "Tracking file");
		inner.files.entry(folder).or_default().insert(
			name.to_string(),
			FileEntry {
				status,
				previous_name: None,
				observation: None,
			},
		);
		true
	}

	pub fn set_folder_status(&self, path: impl AsRef<Path>, status: ItemStatus) -> bool {
		if !status.applies_to_folders() {
			return false;
		}

		self.inner
			.write()
			.folders
			.get_mut(&normalize(path))
			.map(|entry| entry.status = status)
			.is_some()
	}

	pub fn set_file_status(&self, folder: impl AsRef<Path>, name: &str, status: ItemStatus) -> bool {
		self.inner
			.write()
			.file_mut(&normalize(folder), name)
			.map(|entry| entry.status = status)
			.is_some()
	}

	/// Atomically replace a file status with `transition(current)`, returning the new one
	pub fn update_file_status(
		&self,
		folder: impl AsRef<Path>,
		name: &str,
		transition: impl FnOnce(ItemStatus) -> ItemStatus,
	) -> Option<ItemStatus> {
		let mut inner = self.inner.write();
		let entry = inner.file_mut(&normalize(folder), name)?;
		entry.status = transition(entry.status);
		Some(entry.status)
	}

	pub fn folder_status(&self, path: impl AsRef<Path>) -> Option<ItemStatus> {
		self.inner
			.read()
			.folders
			.get(&normalize(path))
			.map(|entry| entry.status)
	}

	pub fn file_status(&self, folder: impl AsRef<Path>, name: &str) -> Option<ItemStatus> {
		self.inner
			.read()
			.file(&normalize(folder), name)
			.map(|entry| entry.status)
	}

	pub fn folder_watch_handle(&self, path: impl AsRef<Path>) -> Option<WatchHandle> {
		self.inner
			.read()
			.folders
			.get(&normalize(path))
			.and_then(|entry| entry.watch_handle)
	}

	/// Fails if the folder is untracked or already holds a live handle
	pub fn set_folder_watch_handle(&self, path: impl AsRef<Path>, handle: WatchHandle) -> bool {
		match self.inner.write().folders.get_mut(&normalize(path)) {
			Some(entry) if entry.watch_handle.is_none() => {
				entry.watch_handle = Some(handle);
				true
			}
			_ => false,
		}
	}

	/// Forget the folder's handle and hand it to the caller for removal
	pub fn take_folder_watch_handle(&self, path: impl AsRef<Path>) -> Option<WatchHandle> {
		self.inner
			.write()
			.folders
			.get_mut(&normalize(path))
			.and_then(|entry| entry.watch_handle.take())
	}

	/// Unconditional removal of the folder and its file set
	pub fn delete_folder(&self, path: impl AsRef<Path>) -> Option<FolderEntry> {
		let path = normalize(path);
		let mut inner = self.inner.write();
		inner.files.remove(&path);
		inner.folders.remove(&path)
	}

	pub fn delete_file(&self, folder: impl AsRef<Path>, name: &str) -> Option<FileEntry> {
		let folder = normalize(folder);
		let mut inner = self.inner.write();
		let files = inner.files.get_mut(&folder)?;
		let removed = files.remove(name);
		if files.is_empty() {
			inner.files.remove(&folder);
		}
		removed
	}

	/// `NewAdded` folders are purged, any other is marked `Deleted`; the handle
	/// is forgotten in both cases and returned for removal
	pub fn remove_folder(
		&self,
		path: impl AsRef<Path>,
	) -> Option<(Removal, Option<WatchHandle>)> {
		let path = normalize(path);
		let mut inner = self.inner.write();
		let entry = inner.folders.get_mut(&path)?;
		let handle = entry.watch_handle.take();

		if entry.status == ItemStatus::NewAdded {
			inner.folders.remove(&path);
			inner.files.remove(&path);
			Some((Removal::Purged, handle))
		} else {
			entry.status = ItemStatus::Deleted;
			Some((Removal::MarkedDeleted, handle))
		}
	}

	pub fn remove_file(&self, folder: impl AsRef<Path>, name: &str) -> Option<Removal> {
		let folder = normalize(folder);
		let mut inner = self.inner.write();
		let files = inner.files.get_mut(&folder)?;
		let entry = files.get_mut(name)?;

		if entry.status == ItemStatus::NewAdded {
			files.remove(name);
			if files.is_empty() {
				inner.files.remove(&folder);
			}
			Some(Removal::Purged)
		} else {
			entry.status = ItemStatus::Deleted;
			Some(Removal::MarkedDeleted)
		}
	}

	/// Write-once per episode, returns whether it was written
	pub fn set_previous_folder_path(&self, path: impl AsRef<Path>, previous: &Path) -> bool {
		self.inner
			.write()
			.folders
			.get_mut(&normalize(path))
			.is_some_and(|entry| entry.remember_previous_path(previous))
	}

	/// Write-once per episode, returns whether it was written
	pub fn set_previous_file_name(&self, folder: impl AsRef<Path>, name: &str, previous: &str) -> bool {
		self.inner
			.write()
			.file_mut(&normalize(folder), name)
			.is_some_and(|entry| entry.remember_previous_name(previous))
	}

	pub fn previous_folder_path(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
		self.inner
			.read()
			.folders
			.get(&normalize(path))
			.and_then(|entry| entry.previous_path.clone())
	}

	pub fn previous_file_name(&self, folder: impl AsRef<Path>, name: &str) -> Option<String> {
		self.inner
			.read()
			.file(&normalize(folder), name)
			.and_then(|entry| entry.previous_name.clone())
	}

	/// Full paths of every item of `kind` currently in `status`
	pub fn query_by_status(&self, kind: ItemKind, status: ItemStatus) -> BTreeSet<PathBuf> {
		let inner = self.inner.read();

		match kind {
			ItemKind::Folder => inner
				.folders
				.iter()
				.filter(|(_, entry)| entry.status == status)
				.map(|(path, _)| path.clone())
				.collect(),
			ItemKind::File if status == ItemStatus::Missing => inner.missing.clone(),
			ItemKind::File => inner
				.files
				.iter()
				.flat_map(|(folder, files)| {
					files
						.iter()
						.filter(|(_, entry)| entry.status == status)
						.map(move |(name, _)| folder.join(name))
				})
				.collect(),
		}
	}

	/// Re-key `from` as `to` together with its file set and every descendant
	/// folder. The renamed folder's status goes through
	/// [`ItemStatus::after_folder_rename`] and it remembers `from` once per
	/// episode. Returns the watches now living under new paths.
	pub fn rename_folder(
		&self,
		from: impl AsRef<Path>,
		to: impl AsRef<Path>,
	) -> Option<Vec<(PathBuf, WatchHandle)>> {
		let (from, to) = (normalize(from), normalize(to));
		let mut inner = self.inner.write();

		if !inner.folders.contains_key(&from) || inner.folders.contains_key(&to) {
			return None;
		}

		let mut moved = inner.descendants_of(&from);
		moved.push(from.clone());

		let mut relocated = Vec::with_capacity(moved.len());
		for old in moved {
			let Ok(suffix) = old.strip_prefix(&from) else {
				continue;
			};
			let new = if suffix.as_os_str().is_empty() {
				to.clone()
			} else {
				to.join(suffix)
			};

			if let Some(mut entry) = inner.folders.remove(&old) {
				if old == from {
					entry.status = entry.status.after_folder_rename();
					if entry.status != ItemStatus::NewAdded {
						entry.remember_previous_path(&from);
					}
				}
				if let Some(handle) = entry.watch_handle {
					relocated.push((new.clone(), handle));
				}
				inner.folders.insert(new.clone(), entry);
			}

			if let Some(files) = inner.files.remove(&old) {
				inner.files.insert(new, files);
			}
		}

		Some(relocated)
	}

	/// Re-key a file within its folder, applying [`ItemStatus::after_file_rename`]
	/// and remembering `from` once per episode. Returns the new status.
	pub fn rename_file(&self, folder: impl AsRef<Path>, from: &str, to: &str) -> Option<ItemStatus> {
		let folder = normalize(folder);
		let mut inner = self.inner.write();
		let files = inner.files.get_mut(&folder)?;

		if files.contains_key(to) {
			return None;
		}

		let mut entry = files.remove(from)?;
		entry.status = entry.status.after_file_rename();
		if entry.status != ItemStatus::NewAdded {
			entry.remember_previous_name(from);
		}
		let status = entry.status;
		files.insert(to.to_string(), entry);

		Some(status)
	}

	/// Outermost tracked folder containing `path` (itself included), if any
	pub fn outermost_tracked(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
		let path = normalize(path);
		let inner = self.inner.read();

		path.ancestors()
			.filter(|ancestor| inner.folders.contains_key(*ancestor))
			.last()
			.map(Path::to_path_buf)
	}

	/// Tracked folders strictly below `path`
	pub fn descendant_folders(&self, path: impl AsRef<Path>) -> Vec<PathBuf> {
		let mut descendants = self.inner.read().descendants_of(&normalize(path));
		descendants.sort();
		descendants
	}

	/// Every tracked folder
	pub fn folders(&self) -> Vec<PathBuf> {
		let mut folders = self
			.inner
			.read()
			.folders
			.keys()
			.cloned()
			.collect::<Vec<_>>();
		folders.sort();
		folders
	}

	pub fn files_in(&self, folder: impl AsRef<Path>) -> Vec<String> {
		let mut names = self
			.inner
			.read()
			.files
			.get(&normalize(folder))
			.map(|files| files.keys().cloned().collect::<Vec<_>>())
			.unwrap_or_default();
		names.sort();
		names
	}

	pub fn observation(&self, folder: impl AsRef<Path>, name: &str) -> Option<Observation> {
		self.inner
			.read()
			.file(&normalize(folder), name)
			.and_then(|entry| entry.observation.clone())
	}

	pub fn set_observation(&self, folder: impl AsRef<Path>, name: &str, observation: Observation) -> bool {
		self.inner
			.write()
			.file_mut(&normalize(folder), name)
			.map(|entry| entry.observation = Some(observation))
			.is_some()
	}

	/// Close the folder's episode: `Deleted` rows go away with their files, any
	/// other row is back to `Monitored`
	pub fn commit_folder(&self, path: impl AsRef<Path>) -> bool {
		let path = normalize(path);
		let mut inner = self.inner.write();

		let Some(entry) = inner.folders.get_mut(&path) else {
			return false;
		};

		if entry.status == ItemStatus::Deleted {
			inner.folders.remove(&path);
			inner.files.remove(&path);
		} else {
			entry.status = ItemStatus::Monitored;
			entry.previous_path = None;
		}
		true
	}

	/// Close the file's episode, same rules as [`Self::commit_folder`]
	pub fn commit_file(&self, folder: impl AsRef<Path>, name: &str) -> bool {
		let folder = normalize(folder);
		let mut inner = self.inner.write();

		let Some(files) = inner.files.get_mut(&folder) else {
			return false;
		};
		let Some(entry) = files.get_mut(name) else {
			return false;
		};

		if entry.status == ItemStatus::Deleted {
			files.remove(name);
			if files.is_empty() {
				inner.files.remove(&folder);
			}
		} else {
			entry.status = ItemStatus::Monitored;
			entry.previous_name = None;
			entry.observation = None;
		}
		true
	}

	pub fn add_missing(&self, path: impl AsRef<Path>) {
		self.inner.write().missing.insert(normalize(path));
	}

	pub fn clear_missing(&self) {
		self.inner.write().missing.clear();
	}

	pub fn missing_paths(&self) -> BTreeSet<PathBuf> {
		self.inner.read().missing.clone()
	}

	pub fn record_error(&self, error: MonitoringError) {
		self.inner.write().errors.push(error);
	}

	/// Drop the errors recorded under `context`, returns how many went away
	pub fn clear_errors(&self, context: ErrorContext) -> usize {
		let mut inner = self.inner.write();
		let before = inner.errors.len();
		inner.errors.retain(|error| error.context != context);
		before - inner.errors.len()
	}

	pub fn errors(&self) -> Vec<MonitoringError> {
		self.inner.read().errors.clone()
	}

	/// Forget every watch handle, used on shutdown
	pub fn drain_watch_handles(&self) -> Vec<WatchHandle> {
		self.inner
			.write()
			.folders
			.values_mut()
			.filter_map(|entry| entry.watch_handle.take())
			.collect()
	}

	pub fn snapshot(&self) -> StoreSnapshot {
		let inner = self.inner.read();

		StoreSnapshot {
			folders: inner
				.folders
				.iter()
				.map(|(path, entry)| (path.clone(), entry.clone()))
				.collect(),
			files: inner
				.files
				.iter()
				.map(|(folder, files)| {
					(
						folder.clone(),
						files
							.iter()
							.map(|(name, entry)| (name.clone(), entry.clone()))
							.collect(),
					)
				})
				.collect(),
			missing: inner.missing.clone(),
			errors: inner.errors.clone(),
		}
	}
}
