use std::{ffi::OsStr, fs, path::Path, time::Duration};

use fm_fs_watcher::{NotifyBackend, WatchBackend, WatchErrorKind, WatchEvent, WatchHandle};
use tempfile::TempDir;
use tokio::time::timeout;
use tracing_test::traced_test;

const WAIT: Duration = Duration::from_secs(5);

async fn next_matching(
	rx: &async_channel::Receiver<WatchEvent>,
	mut pred: impl FnMut(&WatchEvent) -> bool,
) -> WatchEvent {
	timeout(WAIT, async {
		loop {
			let event = rx.recv().await.expect("backend closed its channel");
			if pred(&event) {
				return event;
			}
		}
	})
	.await
	.expect("timed out waiting for watch event")
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn reports_created_file() {
	let dir = TempDir::new().unwrap();
	let (tx, rx) = async_channel::unbounded();
	let backend = NotifyBackend::new(tx).unwrap();

	backend.install_watch(dir.path(), false).unwrap();
	fs::write(dir.path().join("a.txt"), b"hello").unwrap();

	let event = next_matching(&rx, WatchEvent::is_added).await;
	assert_eq!(event.dir(), dir.path());
	assert_eq!(event.name(), OsStr::new("a.txt"));

	backend.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn reports_rename_in_place_as_move() {
	let dir = TempDir::new().unwrap();
	fs::write(dir.path().join("old.txt"), b"x").unwrap();

	let (tx, rx) = async_channel::unbounded();
	let backend = NotifyBackend::new(tx).unwrap();
	backend.install_watch(dir.path(), false).unwrap();

	fs::rename(dir.path().join("old.txt"), dir.path().join("new.txt")).unwrap();

	let event = next_matching(&rx, WatchEvent::is_moved).await;
	assert_eq!(
		event,
		WatchEvent::Moved {
			dir: dir.path().to_path_buf(),
			old_name: "old.txt".into(),
			new_name: "new.txt".into(),
		}
	);

	backend.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn missing_path_is_not_found() {
	let dir = TempDir::new().unwrap();
	let (tx, _rx) = async_channel::unbounded();
	let backend = NotifyBackend::new(tx).unwrap();

	let error = backend
		.install_watch(&dir.path().join("nope"), false)
		.unwrap_err();
	assert_eq!(error.kind(), WatchErrorKind::NotFound);
	assert!(backend.watched_paths().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn remove_watch_is_idempotent() {
	let dir = TempDir::new().unwrap();
	let (tx, _rx) = async_channel::unbounded();
	let backend = NotifyBackend::new(tx).unwrap();

	let handle = backend.install_watch(dir.path(), false).unwrap();
	assert_eq!(backend.watched_paths(), vec![(handle, dir.path().to_path_buf())]);

	backend.remove_watch(handle);
	backend.remove_watch(handle);
	backend.remove_watch(WatchHandle::new(9_999));

	assert!(backend.watched_paths().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn relocated_watch_follows_the_directory() {
	let root = TempDir::new().unwrap();
	let before = root.path().join("before");
	let after = root.path().join("after");
	fs::create_dir(&before).unwrap();

	let (tx, rx) = async_channel::unbounded();
	let backend = NotifyBackend::new(tx).unwrap();
	let handle = backend.install_watch(&before, false).unwrap();

	fs::rename(&before, &after).unwrap();
	backend.relocate_watch(handle, &after).unwrap();
	assert_eq!(backend.watched_paths(), vec![(handle, after.clone())]);

	fs::write(after.join("inside.txt"), b"x").unwrap();
	let event = next_matching(&rx, |e| e.is_added() && e.dir() == Path::new(&after)).await;
	assert_eq!(event.name(), OsStr::new("inside.txt"));

	backend.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn relocating_unknown_handle_fails() {
	let dir = TempDir::new().unwrap();
	let (tx, _rx) = async_channel::unbounded();
	let backend = NotifyBackend::new(tx).unwrap();

	let error = backend
		.relocate_watch(WatchHandle::new(42), dir.path())
		.unwrap_err();
	assert_eq!(error.kind(), WatchErrorKind::Generic);
}
