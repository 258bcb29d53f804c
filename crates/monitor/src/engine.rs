//! Reconciliation engine
//!
//! Applies the status rules for each canonical event. Every handler asks the
//! storage authority about the path first: frozen paths are observed but never
//! mutated, and an authority that fails or is too slow is taken as "never
//! committed".

use std::{
	ffi::OsStr,
	path::{Path, PathBuf},
	sync::Arc,
};

use chrono::{DateTime, Utc};
use fm_fs_watcher::{WatchBackend, WatchHandle};
use tokio::{fs, time::timeout};
use tracing::{debug, error, instrument, trace, warn};

use crate::{
	authority::{StorageAuthority, StorageFacts},
	bootstrap::walk_subtree,
	config::{ChangeDetection, MonitorConfig},
	error::{AuthorityError, ErrorContext, FileIOError, MonitoringError},
	hash::{file_checksum, timestamps_match},
	listener::FsEvent,
	path::{name_is_hidden, normalize, path_is_hidden, split_file},
	report::StatusReport,
	status::ItemStatus,
	store::{Observation, StatusStore},
};

pub struct Engine {
	pub(crate) store: StatusStore,
	pub(crate) backend: Arc<dyn WatchBackend>,
	pub(crate) authority: Arc<dyn StorageAuthority>,
	pub(crate) config: MonitorConfig,
}

impl std::fmt::Debug for Engine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Engine")
			.field("store", &self.store)
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

impl Engine {
	pub fn new(
		backend: Arc<dyn WatchBackend>,
		authority: Arc<dyn StorageAuthority>,
		config: MonitorConfig,
	) -> Self {
		Self {
			store: StatusStore::new(),
			backend,
			authority,
			config,
		}
	}

	#[must_use]
	pub const fn store(&self) -> &StatusStore {
		&self.store
	}

	#[must_use]
	pub const fn config(&self) -> &MonitorConfig {
		&self.config
	}

	pub async fn handle(&self, event: FsEvent) {
		match event {
			FsEvent::Added(path) => self.on_added(&path, self.config.scan_new_folders).await,
			FsEvent::Deleted(path) => self.on_deleted(&path).await,
			FsEvent::Modified(path) => self.on_modified(&path).await,
			FsEvent::Moved { from, to } => self.on_moved(&from, &to).await,
		}
	}

	pub(crate) async fn storage(&self, path: &Path) -> StorageFacts {
		let limit = self.config.authority_timeout();

		match timeout(limit, self.authority.query(path)).await {
			Ok(Ok(facts)) => facts,
			Ok(Err(e)) => {
				error!(?e, path = %path.display(), "Storage authority query failed, assuming not persisted;");
				StorageFacts::default()
			}
			Err(_) => {
				error!(
					e = %AuthorityError::Timeout(limit),
					path = %path.display(),
					"Storage authority query failed, assuming not persisted;",
				);
				StorageFacts::default()
			}
		}
	}

	pub(crate) fn split(path: &Path) -> Option<(PathBuf, String)> {
		split_file(path).unwrap_or_else(|e| {
			warn!(?e, "Dropping path;");
			None
		})
	}

	/// Make sure a tracked folder holds a live watch, returns whether it does
	pub(crate) fn ensure_watch(&self, path: &Path, context: ErrorContext) -> bool {
		if self.store.folder_watch_handle(path).is_some() {
			return true;
		}

		match self.backend.install_watch(path, false) {
			Ok(handle) => {
				if self.store.set_folder_watch_handle(path, handle) {
					trace!(%handle, path = %path.display(), "Watching folder");
					true
				} else {
					// Someone else installed one meanwhile, or the folder left the store
					self.backend.remove_watch(handle);
					self.store.folder_watch_handle(path).is_some()
				}
			}
			Err(e) => {
				warn!(?e, path = %path.display(), %context, "Failed to watch folder;");
				self.store
					.record_error(MonitoringError::from_watch(path, context, &e));
				false
			}
		}
	}

	fn release_watch(&self, maybe_handle: Option<WatchHandle>) {
		if let Some(handle) = maybe_handle {
			self.backend.remove_watch(handle);
		}
	}

	#[instrument(skip(self, path), fields(path = %path.display()))]
	pub async fn on_added(&self, path: &Path, scan: bool) {
		let path = normalize(path);

		let metadata = match fs::symlink_metadata(&path).await {
			Ok(metadata) => metadata,
			Err(e) => {
				trace!(?e, "Added entry is already gone");
				return;
			}
		};

		if path_is_hidden(&path, &metadata) {
			trace!("Ignoring hidden entry");
		} else if metadata.is_dir() {
			if self.added_folder(&path).await && scan {
				self.scan_new_folder(&path).await;
			}
		} else if metadata.is_file() {
			self.added_file(&path).await;
		} else {
			trace!("Ignoring non regular entry");
		}
	}

	/// Returns `false` when the folder could not be watched and is not tracked
	async fn added_folder(&self, path: &Path) -> bool {
		let facts = self.storage(path).await;

		// Tracked before the watch exists, so its first events find it
		let fresh = self.store.add_folder(path, ItemStatus::Monitored);

		if !self.ensure_watch(path, ErrorContext::AddEvent) {
			if fresh {
				self.store.delete_folder(path);
			}
			return false;
		}

		if facts.frozen {
			trace!("Folder is frozen, watching without pending status");
		} else if !facts.persisted {
			self.store.set_folder_status(path, ItemStatus::NewAdded);
			debug!("New folder");
		} else if !fresh {
			self.store.set_folder_status(path, ItemStatus::Updated);
			debug!("Committed folder showed up again");
		}

		true
	}

	async fn added_file(&self, path: &Path) {
		let Some((folder, name)) = Self::split(path) else {
			return;
		};

		let facts = self.storage(path).await;
		if facts.frozen {
			trace!("File is frozen, ignoring");
			return;
		}

		let status = if facts.persisted {
			self.store
				.update_file_status(&folder, &name, ItemStatus::after_update)
				.or_else(|| {
					self.store
						.add_file(&folder, &name, ItemStatus::Updated)
						.then_some(ItemStatus::Updated)
				})
		} else if self.store.file_exists(&folder, &name) {
			None
		} else {
			self.store
				.add_file(&folder, &name, ItemStatus::NewAdded)
				.then_some(ItemStatus::NewAdded)
		};

		match status {
			Some(status) => debug!(%status, "File added"),
			None if !self.store.folder_exists(&folder) => {
				trace!(folder = %folder.display(), "Parent folder is not tracked");
			}
			None => trace!("File already tracked"),
		}
	}

	/// Apply the Added rules to everything already inside a folder that just
	/// showed up, entries created before its watch existed included
	async fn scan_new_folder(&self, root: &Path) {
		let walked = walk_subtree(root).await;
		for (path, e) in &walked.errors {
			warn!(?e, path = %path.display(), "Failed to scan new folder entry;");
		}

		let mut unwatched = Vec::<PathBuf>::new();
		for entry in walked.entries {
			if unwatched.iter().any(|skipped| entry.path.starts_with(skipped)) {
				continue;
			}

			if entry.is_dir {
				if !self.added_folder(&entry.path).await {
					unwatched.push(entry.path);
				}
			} else {
				self.added_file(&entry.path).await;
			}
		}
	}

	#[instrument(skip(self, path), fields(path = %path.display()))]
	pub async fn on_deleted(&self, path: &Path) {
		let path = normalize(path);

		if self.store.folder_exists(&path) {
			self.deleted_folder(&path).await;
		} else if let Some((folder, name)) = Self::split(&path) {
			if self.store.file_exists(&folder, &name) {
				self.deleted_file(&path, &folder, &name).await;
			} else {
				trace!("Ignoring delete of untracked entry");
			}
		}
	}

	async fn deleted_file(&self, path: &Path, folder: &Path, name: &str) {
		if self.storage(path).await.frozen {
			trace!(path = %path.display(), "File is frozen, ignoring delete");
			return;
		}

		match self.store.remove_file(folder, name) {
			Some(removal) => debug!(?removal, path = %path.display(), "File deleted"),
			None => trace!(path = %path.display(), "File already left the store"),
		}
	}

	/// Deletes cascade to whatever is still tracked below the folder, deepest first
	async fn deleted_folder(&self, path: &Path) {
		let mut folders = self.store.descendant_folders(path);
		folders.reverse();
		folders.push(path.to_path_buf());

		for folder in folders {
			for name in self.store.files_in(&folder) {
				self.deleted_file(&folder.join(&name), &folder, &name).await;
			}

			if self.storage(&folder).await.frozen {
				trace!(folder = %folder.display(), "Folder is frozen, only dropping its watch");
				self.release_watch(self.store.take_folder_watch_handle(&folder));
				continue;
			}

			if let Some((removal, maybe_handle)) = self.store.remove_folder(&folder) {
				self.release_watch(maybe_handle);
				debug!(?removal, folder = %folder.display(), "Folder deleted");
			}
		}
	}

	#[instrument(skip(self, path), fields(path = %path.display()))]
	pub async fn on_modified(&self, path: &Path) {
		let path = normalize(path);
		let Some((folder, name)) = Self::split(&path) else {
			return;
		};

		match self.store.file_status(&folder, &name) {
			None => {
				trace!("Ignoring modify of untracked entry");
				return;
			}
			Some(ItemStatus::NewAdded) => {
				trace!("File was never committed, nothing to compare against");
				return;
			}
			Some(_) => {}
		}

		let facts = self.storage(&path).await;
		if facts.frozen {
			trace!("File is frozen, ignoring modify");
			return;
		}

		let metadata = match fs::metadata(&path).await {
			Ok(metadata) if metadata.is_file() => metadata,
			Ok(_) => return,
			Err(e) => {
				debug!(
					e = %FileIOError::from((&path, e, "reading modified file metadata")),
					"Dropping modify event;",
				);
				return;
			}
		};

		let size = metadata.len();
		let modified = metadata
			.modified()
			.map_or_else(|_| Utc::now(), DateTime::<Utc>::from);

		if self
			.store
			.observation(&folder, &name)
			.is_some_and(|seen| seen.size == size && seen.modified == modified)
		{
			trace!("File unchanged since it was last evaluated");
			return;
		}

		let tolerance = self.config.timestamp_tolerance();
		let differs_in_time = |committed_at: Option<DateTime<Utc>>| {
			committed_at.map_or(true, |at| !timestamps_match(modified, at, tolerance))
		};

		let (changed, hash) = match self.config.change_detection {
			ChangeDetection::Hash => {
				let current = match file_checksum(&path).await {
					Ok(hash) => hash,
					Err(e) => {
						debug!(%e, "Dropping modify event;");
						return;
					}
				};

				let changed = facts.hash.as_ref().map_or_else(
					|| differs_in_time(facts.last_modified),
					|committed| committed != &current,
				);

				(changed, Some(current))
			}
			ChangeDetection::Timestamp => (differs_in_time(facts.last_modified), None),
		};

		self.store
			.set_observation(&folder, &name, Observation { size, modified, hash });

		if !changed {
			debug!("Content matches the committed version, ignoring modify");
			return;
		}

		if let Some(status) = self
			.store
			.update_file_status(&folder, &name, ItemStatus::after_update)
		{
			debug!(%status, "File updated");
		}
	}

	#[instrument(skip(self, from, to), fields(from = %from.display(), to = %to.display()))]
	pub async fn on_moved(&self, from: &Path, to: &Path) {
		let (from, to) = (normalize(from), normalize(to));

		let hidden = |path: &Path| {
			path.file_name()
				.and_then(OsStr::to_str)
				.is_some_and(name_is_hidden)
		};
		if hidden(&from) || hidden(&to) {
			trace!("Ignoring move involving a hidden entry");
			return;
		}

		if self.store.folder_exists(&from) {
			self.moved_folder(&from, &to).await;
			return;
		}

		let (Some((from_folder, from_name)), Some((to_folder, to_name))) =
			(Self::split(&from), Self::split(&to))
		else {
			return;
		};

		if !self.store.file_exists(&from_folder, &from_name) {
			trace!("Source is not tracked, handling destination as added");
			self.on_added(&to, self.config.scan_new_folders).await;
		} else if from_folder != to_folder {
			self.on_deleted(&from).await;
			self.on_added(&to, false).await;
		} else if self.store.file_exists(&to_folder, &to_name) {
			self.moved_file_over(&from, &to, &to_folder, &from_name, &to_name)
				.await;
		} else if self.storage(&from).await.frozen {
			trace!("File is frozen, ignoring rename");
		} else if let Some(status) = self.store.rename_file(&to_folder, &from_name, &to_name) {
			debug!(%status, "File renamed");
		}
	}

	/// A tracked file replaced another tracked file: the destination counts as
	/// updated and the source entry goes away
	async fn moved_file_over(
		&self,
		from: &Path,
		to: &Path,
		folder: &Path,
		from_name: &str,
		to_name: &str,
	) {
		if self.storage(to).await.frozen {
			trace!("Destination is frozen, keeping its status");
		} else if let Some(status) =
			self.store
				.update_file_status(folder, to_name, ItemStatus::after_update)
		{
			debug!(%status, "File overwritten by move");
		}

		if self.storage(from).await.frozen {
			trace!("Source is frozen, keeping its entry");
		} else {
			self.store.delete_file(folder, from_name);
		}
	}

	async fn moved_folder(&self, from: &Path, to: &Path) {
		if self.store.folder_exists(to) {
			debug!("Folder moved onto a tracked folder, the source is gone");
			self.deleted_folder(from).await;
			return;
		}

		if self.storage(from).await.frozen {
			trace!("Folder is frozen, ignoring rename");
			return;
		}

		let Some(relocated) = self.store.rename_folder(from, to) else {
			trace!("Folder left the store meanwhile");
			return;
		};

		for (path, handle) in relocated {
			if let Err(e) = self.backend.relocate_watch(handle, &path) {
				warn!(?e, path = %path.display(), "Failed to move watch to renamed folder;");
				self.store
					.record_error(MonitoringError::from_watch(&path, ErrorContext::AddEvent, &e));
				self.release_watch(self.store.take_folder_watch_handle(&path));
			}
		}

		if let Some(status) = self.store.folder_status(to) {
			debug!(%status, "Folder renamed");
		}
	}

	/// Register a folder on request. Returns `false` when it is already tracked,
	/// is not a directory or cannot be watched.
	#[instrument(skip(self, path), fields(path = %path.display()))]
	pub async fn add_folder_watch(&self, path: &Path) -> bool {
		let path = normalize(path);

		if self.store.folder_exists(&path) {
			return false;
		}

		match fs::metadata(&path).await {
			Ok(metadata) if metadata.is_dir() => {}
			_ => {
				debug!("Not a directory, refusing to watch");
				return false;
			}
		}

		let facts = self.storage(&path).await;
		let status = if facts.persisted || facts.frozen {
			ItemStatus::Monitored
		} else {
			ItemStatus::NewAdded
		};

		if !self.store.add_folder(&path, status) {
			return false;
		}

		if !self.ensure_watch(&path, ErrorContext::AddEvent) {
			self.store.delete_folder(&path);
			return false;
		}

		if self.config.scan_new_folders {
			self.discover(&path, ErrorContext::AddEvent).await;
		}

		true
	}

	/// Register a file on request. Its folder must be tracked and the file must
	/// exist as a regular, visible, non frozen file.
	#[instrument(skip(self, folder), fields(folder = %folder.display()))]
	pub async fn add_file_watch(&self, folder: &Path, name: &str) -> bool {
		let folder = normalize(folder);
		let path = folder.join(name);

		if !self.store.folder_exists(&folder) || self.store.file_exists(&folder, name) {
			return false;
		}

		match fs::symlink_metadata(&path).await {
			Ok(metadata) if metadata.is_file() && !path_is_hidden(&path, &metadata) => {}
			_ => {
				debug!(name, "Not a regular file, refusing to track");
				return false;
			}
		}

		let facts = self.storage(&path).await;
		if facts.frozen {
			return false;
		}

		self.store.add_file(
			&folder,
			name,
			if facts.persisted {
				ItemStatus::Monitored
			} else {
				ItemStatus::NewAdded
			},
		)
	}

	/// The storage authority flushed `path`: close its episode
	pub fn acknowledge_commit(&self, path: &Path) -> bool {
		let path = normalize(path);

		if self.store.folder_exists(&path) {
			return self.store.commit_folder(&path);
		}

		Self::split(&path).is_some_and(|(folder, name)| self.store.commit_file(folder, &name))
	}

	#[must_use]
	pub fn report(&self) -> StatusReport {
		StatusReport::from_snapshot(&self.store.snapshot())
	}

	/// Release every outstanding watch, returns how many were released
	pub fn shutdown(&self) -> usize {
		let handles = self.store.drain_watch_handles();
		let count = handles.len();

		for handle in handles {
			self.backend.remove_watch(handle);
		}

		debug!(count, "Released watches");
		count
	}
}
