//! Bootstrap and discovery
//!
//! Registers the configured roots first, then walks every registered subtree
//! so the watch set covers folders that only exist below a root. Entries the
//! storage authority does not know about are seeded as new.

use std::{
	io,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::{fs, task::spawn_blocking, time::timeout};
use tracing::{debug, error, info, instrument, trace, warn};
use walkdir::{DirEntry, WalkDir};

use crate::{
	authority::ActiveFolder,
	engine::Engine,
	error::{AuthorityError, ErrorContext, MonitoringError},
	path::{name_is_hidden, normalize, path_is_hidden},
	status::ItemStatus,
};

/// What a bootstrap run registered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapSummary {
	pub roots: usize,
	pub missing: usize,
	pub folders: usize,
	pub files: usize,
	pub errors: usize,
}

#[derive(Debug)]
pub(crate) struct WalkedEntry {
	pub(crate) path: PathBuf,
	pub(crate) is_dir: bool,
}

/// Visible folders and regular files below a root, parents before children
#[derive(Debug, Default)]
pub(crate) struct Walked {
	pub(crate) entries: Vec<WalkedEntry>,
	pub(crate) errors: Vec<(PathBuf, io::Error)>,
}

pub(crate) async fn walk_subtree(root: &Path) -> Walked {
	let root = root.to_path_buf();

	match spawn_blocking(move || walk_blocking(&root)).await {
		Ok(walked) => walked,
		Err(e) => {
			error!(?e, "Subtree walk task failed;");
			Walked::default()
		}
	}
}

fn walk_blocking(root: &Path) -> Walked {
	let mut walked = Walked::default();

	for entry in WalkDir::new(root)
		.min_depth(1)
		.follow_links(false)
		.into_iter()
		.filter_entry(|entry| !entry_is_hidden(entry))
	{
		match entry {
			Ok(entry) => {
				let file_type = entry.file_type();
				if file_type.is_dir() || file_type.is_file() {
					walked.entries.push(WalkedEntry {
						is_dir: file_type.is_dir(),
						path: normalize(entry.into_path()),
					});
				}
			}
			Err(e) => {
				let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
				walked.errors.push((path, io::Error::from(e)));
			}
		}
	}

	walked
}

fn entry_is_hidden(entry: &DirEntry) -> bool {
	entry.metadata().map_or_else(
		|_| entry.file_name().to_str().is_some_and(name_is_hidden),
		|metadata| path_is_hidden(entry.path(), &metadata),
	)
}

/// Keep only folders that are not below another folder of the list
fn outermost(mut folders: Vec<PathBuf>) -> Vec<PathBuf> {
	folders.sort();
	folders.dedup();

	let mut kept = Vec::<PathBuf>::with_capacity(folders.len());
	for folder in folders {
		if !kept.iter().any(|outer| folder.starts_with(outer)) {
			kept.push(folder);
		}
	}
	kept
}

impl Engine {
	/// Register `roots` (folders or files) and discover everything below the
	/// registered folders. Missing entries and the startup errors of a previous
	/// run are dropped.
	#[instrument(skip_all, fields(roots = roots.len()))]
	pub async fn bootstrap(&self, roots: &[PathBuf]) -> BootstrapSummary {
		self.store.clear_missing();
		self.store.clear_errors(ErrorContext::Initialization);
		self.store.clear_errors(ErrorContext::Discovery);

		let errors_before = self.store.errors().len();
		let mut summary = BootstrapSummary {
			roots: roots.len(),
			..Default::default()
		};

		for root in roots {
			let root = normalize(root);

			let metadata = match fs::metadata(&root).await {
				Ok(metadata) => metadata,
				Err(e) => {
					warn!(?e, root = %root.display(), "Configured root not found;");
					self.store.record_error(MonitoringError::from_io(
						&root,
						ErrorContext::Initialization,
						&e,
					));
					self.store.add_missing(&root);
					summary.missing += 1;
					continue;
				}
			};

			if metadata.is_dir() {
				if self
					.discover_folder(&root, ErrorContext::Initialization)
					.await == Some(true)
				{
					summary.folders += 1;
				}
			} else if let Some(folder) = root.parent() {
				if self
					.discover_folder(folder, ErrorContext::Initialization)
					.await
					.is_some() && self.discover_file(&root).await
				{
					summary.files += 1;
				}
			}
		}

		for folder in outermost(self.store.folders()) {
			let (folders, files) = self.discover(&folder, ErrorContext::Discovery).await;
			summary.folders += folders;
			summary.files += files;
		}

		summary.errors = self.store.errors().len().saturating_sub(errors_before);

		info!(
			missing = summary.missing,
			folders = summary.folders,
			files = summary.files,
			errors = summary.errors,
			"Bootstrap finished",
		);

		summary
	}

	/// Bootstrap from the configured roots plus every active folder and file of
	/// the storage authority
	pub async fn start_monitoring(&self) -> Result<BootstrapSummary, AuthorityError> {
		let limit = self.config.authority_timeout();
		let active = timeout(limit, self.authority.active_folders())
			.await
			.map_err(|_| AuthorityError::Timeout(limit))??;

		let mut roots = self.config.roots.clone();
		for ActiveFolder { path, files } in active {
			roots.extend(files.iter().map(|name| path.join(name)));
			roots.push(path);
		}

		debug!(roots = roots.len(), "Starting monitoring");

		Ok(self.bootstrap(&roots).await)
	}

	/// Walk below `root`, registering untracked folders and files. Returns how
	/// many folders and files were registered.
	pub(crate) async fn discover(&self, root: &Path, context: ErrorContext) -> (usize, usize) {
		let walked = walk_subtree(root).await;

		for (path, e) in &walked.errors {
			warn!(?e, path = %path.display(), %context, "Failed to walk entry;");
			self.store
				.record_error(MonitoringError::from_io(path, context, e));
		}

		let (mut folders, mut files) = (0, 0);
		let mut unwatched = Vec::<PathBuf>::new();

		for entry in walked.entries {
			if unwatched.iter().any(|skipped| entry.path.starts_with(skipped)) {
				continue;
			}

			if entry.is_dir {
				match self.discover_folder(&entry.path, context).await {
					Some(true) => folders += 1,
					Some(false) => {}
					None => unwatched.push(entry.path),
				}
			} else if self.discover_file(&entry.path).await {
				files += 1;
			}
		}

		(folders, files)
	}

	/// Track and watch a folder. `Some(registered)` when it ends up watched,
	/// `None` when the watch could not be installed.
	async fn discover_folder(&self, path: &Path, context: ErrorContext) -> Option<bool> {
		let registered = if self.store.folder_exists(path) {
			false
		} else {
			let facts = self.storage(path).await;
			self.store.add_folder(
				path,
				if facts.persisted || facts.frozen {
					ItemStatus::Monitored
				} else {
					ItemStatus::NewAdded
				},
			)
		};

		if self.ensure_watch(path, context) {
			Some(registered)
		} else {
			if registered {
				self.store.delete_folder(path);
			}
			None
		}
	}

	async fn discover_file(&self, path: &Path) -> bool {
		let Some((folder, name)) = Self::split(path) else {
			return false;
		};

		if self.store.file_exists(&folder, &name) {
			return false;
		}

		let facts = self.storage(path).await;
		if facts.frozen {
			trace!(path = %path.display(), "File is frozen, not tracking");
			return false;
		}

		self.store.add_file(
			&folder,
			&name,
			if facts.persisted {
				ItemStatus::Monitored
			} else {
				ItemStatus::NewAdded
			},
		)
	}
}
