#![allow(dead_code)]

use std::{
	collections::{HashMap, HashSet},
	fs,
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};

use async_trait::async_trait;
use fm_fs_watcher::{WatchBackend, WatchError, WatchHandle};
use fm_monitor::{
	hash::checksum_bytes, path::normalize, ActiveFolder, AuthorityError, Engine, MemoryAuthority,
	MonitorConfig, StorageAuthority, StorageFacts,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

/// Backend that records watches instead of touching the OS
#[derive(Debug, Default)]
pub struct FakeBackend {
	next: AtomicU64,
	live: Mutex<HashMap<WatchHandle, PathBuf>>,
	removed: Mutex<Vec<WatchHandle>>,
	failing: Mutex<HashSet<PathBuf>>,
}

impl FakeBackend {
	pub fn fail_on(&self, path: impl AsRef<Path>) {
		self.failing.lock().insert(normalize(path));
	}

	pub fn live_paths(&self) -> Vec<PathBuf> {
		let mut paths = self.live.lock().values().cloned().collect::<Vec<_>>();
		paths.sort();
		paths
	}

	pub fn is_watched(&self, path: impl AsRef<Path>) -> bool {
		let path = normalize(path);
		self.live.lock().values().any(|watched| *watched == path)
	}

	pub fn removed(&self) -> Vec<WatchHandle> {
		self.removed.lock().clone()
	}
}

impl WatchBackend for FakeBackend {
	fn install_watch(&self, path: &Path, _recursive: bool) -> Result<WatchHandle, WatchError> {
		let path = normalize(path);

		if self.failing.lock().contains(&path) {
			return Err(WatchError::PermissionDenied(path));
		}
		if !path.is_dir() {
			return Err(WatchError::NotFound(path));
		}

		let handle = WatchHandle::new(self.next.fetch_add(1, Ordering::Relaxed) + 1);
		self.live.lock().insert(handle, path);
		Ok(handle)
	}

	fn remove_watch(&self, handle: WatchHandle) {
		if self.live.lock().remove(&handle).is_some() {
			self.removed.lock().push(handle);
		}
	}

	fn relocate_watch(&self, handle: WatchHandle, new_path: &Path) -> Result<(), WatchError> {
		self.live
			.lock()
			.get_mut(&handle)
			.map(|path| *path = normalize(new_path))
			.ok_or(WatchError::UnknownHandle(handle))
	}
}

/// Authority that answers after a delay
pub struct SlowAuthority {
	pub inner: MemoryAuthority,
	pub delay: Duration,
}

#[async_trait]
impl StorageAuthority for SlowAuthority {
	async fn query(&self, path: &Path) -> Result<StorageFacts, AuthorityError> {
		sleep(self.delay).await;
		self.inner.query(path).await
	}

	async fn active_folders(&self) -> Result<Vec<ActiveFolder>, AuthorityError> {
		sleep(self.delay).await;
		self.inner.active_folders().await
	}
}

pub fn test_config() -> MonitorConfig {
	MonitorConfig {
		workers: 2,
		authority_timeout_ms: 500,
		..Default::default()
	}
}

pub struct Fixture {
	// Held for its Drop
	pub dir: TempDir,
	pub root: PathBuf,
	pub backend: Arc<FakeBackend>,
	pub authority: Arc<MemoryAuthority>,
}

impl Fixture {
	pub fn new() -> Self {
		let dir = TempDir::new().expect("failed to create temp dir");
		let root = normalize(dir.path().join("data"));
		fs::create_dir(&root).expect("failed to create root");

		Self {
			dir,
			root,
			backend: Arc::new(FakeBackend::default()),
			authority: Arc::new(MemoryAuthority::new()),
		}
	}

	pub fn engine(&self) -> Engine {
		self.engine_with(test_config())
	}

	pub fn engine_with(&self, config: MonitorConfig) -> Engine {
		Engine::new(
			Arc::clone(&self.backend) as Arc<dyn WatchBackend>,
			Arc::clone(&self.authority) as Arc<dyn StorageAuthority>,
			config,
		)
	}

	pub fn path(&self, relative: &str) -> PathBuf {
		self.root.join(relative)
	}

	pub fn write(&self, relative: &str, content: &[u8]) -> PathBuf {
		let path = self.path(relative);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).expect("failed to create parent");
		}
		fs::write(&path, content).expect("failed to write file");
		path
	}

	pub fn mkdir(&self, relative: &str) -> PathBuf {
		let path = self.path(relative);
		fs::create_dir_all(&path).expect("failed to create dir");
		path
	}

	/// Record the file's current content as committed
	pub fn commit_file(&self, relative: &str) {
		let path = self.path(relative);
		let content = fs::read(&path).expect("failed to read file");
		self.authority
			.insert_file(&path, Some(checksum_bytes(&content)), None);
	}

	pub fn commit_folder(&self, relative: &str) {
		self.authority.insert_folder(self.path(relative));
	}
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
	timeout(Duration::from_secs(5), async {
		while !condition() {
			sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("condition not met in time");
}
