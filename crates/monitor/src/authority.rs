//! Storage authority: the record of which paths are committed, frozen, and
//! with what content

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
	error::{AuthorityError, FileIOError, MonitorError},
	path::normalize,
	status::ItemKind,
};

/// What the storage authority knows about one path. The default answer is
/// "never committed, not frozen".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageFacts {
	pub persisted: bool,
	pub frozen: bool,
	pub hash: Option<String>,
	pub version: Option<i64>,
	pub last_modified: Option<DateTime<Utc>>,
}

/// A committed folder and the committed files directly inside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFolder {
	pub path: PathBuf,
	pub files: Vec<String>,
}

#[async_trait]
pub trait StorageAuthority: Send + Sync + 'static {
	async fn query(&self, path: &Path) -> Result<StorageFacts, AuthorityError>;

	/// Every non frozen folder to watch on start, with its committed files
	async fn active_folders(&self) -> Result<Vec<ActiveFolder>, AuthorityError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
	pub path: PathBuf,
	pub kind: ItemKind,
	#[serde(default)]
	pub frozen: bool,
	#[serde(default)]
	pub hash: Option<String>,
	#[serde(default)]
	pub version: i64,
	#[serde(default)]
	pub last_modified: Option<DateTime<Utc>>,
}

/// On-disk seed for [`MemoryAuthority`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
	pub entries: Vec<ManifestEntry>,
}

/// Storage authority kept in memory, optionally seeded from a JSON manifest
#[derive(Debug, Default)]
pub struct MemoryAuthority {
	records: RwLock<HashMap<PathBuf, ManifestEntry>>,
}

impl MemoryAuthority {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn from_manifest(manifest: Manifest) -> Self {
		let authority = Self::new();
		{
			let mut records = authority.records.write();
			for mut entry in manifest.entries {
				entry.path = normalize(&entry.path);
				records.insert(entry.path.clone(), entry);
			}
		}
		authority
	}

	pub async fn load(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
		let path = path.as_ref();

		let bytes = tokio::fs::read(path)
			.await
			.map_err(|e| FileIOError::from((path, e, "reading storage manifest")))?;
		let manifest = serde_json::from_slice::<Manifest>(&bytes)?;

		debug!(
			path = %path.display(),
			entries = manifest.entries.len(),
			"Loaded storage manifest",
		);

		Ok(Self::from_manifest(manifest))
	}

	pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), MonitorError> {
		let path = path.as_ref();
		let bytes = serde_json::to_vec_pretty(&self.manifest())?;

		tokio::fs::write(path, bytes)
			.await
			.map_err(|e| FileIOError::from((path, e, "writing storage manifest")))?;

		Ok(())
	}

	#[must_use]
	pub fn manifest(&self) -> Manifest {
		let mut entries = self.records.read().values().cloned().collect::<Vec<_>>();
		entries.sort_by(|a, b| a.path.cmp(&b.path));
		Manifest { entries }
	}

	/// Replace whatever is recorded for `path` with a fresh first version
	pub fn insert_folder(&self, path: impl AsRef<Path>) {
		self.insert(path, ItemKind::Folder, None, None);
	}

	/// Replace whatever is recorded for `path` with a fresh first version
	pub fn insert_file(
		&self,
		path: impl AsRef<Path>,
		hash: Option<String>,
		last_modified: Option<DateTime<Utc>>,
	) {
		self.insert(path, ItemKind::File, hash, last_modified);
	}

	fn insert(
		&self,
		path: impl AsRef<Path>,
		kind: ItemKind,
		hash: Option<String>,
		last_modified: Option<DateTime<Utc>>,
	) {
		let path = normalize(path);
		self.records.write().insert(
			path.clone(),
			ManifestEntry {
				path,
				kind,
				frozen: false,
				hash,
				version: 1,
				last_modified,
			},
		);
	}

	/// Record a flush of the file's current content, bumping its version
	pub fn commit_file(
		&self,
		path: impl AsRef<Path>,
		hash: Option<String>,
		last_modified: Option<DateTime<Utc>>,
	) {
		self.commit(path, ItemKind::File, hash, last_modified);
	}

	pub fn commit_folder(&self, path: impl AsRef<Path>) {
		self.commit(path, ItemKind::Folder, None, None);
	}

	/// Bump the version of an existing record, creating it when absent
	fn commit(
		&self,
		path: impl AsRef<Path>,
		kind: ItemKind,
		hash: Option<String>,
		last_modified: Option<DateTime<Utc>>,
	) {
		let path = normalize(path);
		let mut records = self.records.write();

		records
			.entry(path.clone())
			.and_modify(|entry| {
				entry.kind = kind;
				entry.hash.clone_from(&hash);
				entry.last_modified = last_modified;
				entry.version += 1;
			})
			.or_insert_with(|| ManifestEntry {
				path,
				kind,
				frozen: false,
				hash,
				version: 1,
				last_modified,
			});
	}

	/// Returns `false` when the path has no record
	pub fn set_frozen(&self, path: impl AsRef<Path>, frozen: bool) -> bool {
		self.records
			.write()
			.get_mut(&normalize(path))
			.map(|entry| entry.frozen = frozen)
			.is_some()
	}

	/// Drop the record of a path whose deletion was flushed, with everything below it
	pub fn forget(&self, path: impl AsRef<Path>) {
		let path = normalize(path);
		self.records
			.write()
			.retain(|recorded, _| !recorded.starts_with(&path));
	}
}

#[async_trait]
impl StorageAuthority for MemoryAuthority {
	async fn query(&self, path: &Path) -> Result<StorageFacts, AuthorityError> {
		Ok(self
			.records
			.read()
			.get(&normalize(path))
			.map(|entry| StorageFacts {
				persisted: true,
				frozen: entry.frozen,
				hash: entry.hash.clone(),
				version: Some(entry.version),
				last_modified: entry.last_modified,
			})
			.unwrap_or_default())
	}

	async fn active_folders(&self) -> Result<Vec<ActiveFolder>, AuthorityError> {
		let records = self.records.read();

		let mut folders = records
			.values()
			.filter(|entry| entry.kind == ItemKind::Folder && !entry.frozen)
			.map(|folder| {
				let mut files = records
					.values()
					.filter(|entry| {
						entry.kind == ItemKind::File
							&& !entry.frozen && entry.path.parent() == Some(folder.path.as_path())
					})
					.filter_map(|entry| entry.path.file_name()?.to_str().map(str::to_string))
					.collect::<Vec<_>>();
				files.sort();

				ActiveFolder {
					path: folder.path.clone(),
					files,
				}
			})
			.collect::<Vec<_>>();

		folders.sort_by(|a, b| a.path.cmp(&b.path));

		Ok(folders)
	}
}
