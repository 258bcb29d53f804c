mod common;

use std::{fs, sync::Arc, time::Duration};

use async_channel as chan;
use common::{test_config, wait_until, Fixture, SlowAuthority};
use fm_fs_watcher::{WatchBackend, WatchEvent};
use fm_monitor::{
	hash::checksum_bytes, FileMonitor, ItemStatus, MemoryAuthority, MonitorConfig,
	StorageAuthority,
};
use tokio::time::sleep;
use tracing_test::traced_test;

fn monitor(fx: &Fixture, config: MonitorConfig) -> (FileMonitor, chan::Sender<WatchEvent>) {
	let (events_tx, events_rx) = chan::unbounded();
	let monitor = FileMonitor::new(
		Arc::clone(&fx.backend) as Arc<dyn WatchBackend>,
		events_rx,
		Arc::clone(&fx.authority) as Arc<dyn StorageAuthority>,
		config,
	);
	(monitor, events_tx)
}

fn send(events_tx: &chan::Sender<WatchEvent>, event: Option<WatchEvent>) {
	events_tx
		.try_send(event.expect("event path has a parent"))
		.expect("monitor stopped listening");
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn events_flow_from_the_channel_to_the_store() {
	let fx = Fixture::new();
	let (monitor, events_tx) = monitor(
		&fx,
		MonitorConfig {
			roots: vec![fx.root.clone()],
			..test_config()
		},
	);
	monitor.bootstrap().await;

	let file = fx.write("a.txt", b"a");
	send(&events_tx, WatchEvent::added(&file));

	wait_until(|| monitor.engine().store().file_exists(&fx.root, "a.txt")).await;
	assert_eq!(
		monitor.report().new_added_file_list,
		vec![file.display().to_string()]
	);

	monitor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn paused_events_are_dropped_for_good() {
	let fx = Fixture::new();
	let (monitor, events_tx) = monitor(&fx, test_config());
	monitor.bootstrap_roots(&[fx.root.clone()]).await;

	monitor.pause();
	assert!(monitor.is_paused());

	let skipped = fx.write("skipped.txt", b"s");
	send(&events_tx, WatchEvent::added(&skipped));
	wait_until(|| events_tx.is_empty()).await;
	sleep(Duration::from_millis(50)).await;

	monitor.resume();
	assert!(!monitor.is_paused());

	let seen = fx.write("seen.txt", b"s");
	send(&events_tx, WatchEvent::added(&seen));

	wait_until(|| monitor.engine().store().file_exists(&fx.root, "seen.txt")).await;
	assert!(!monitor.engine().store().file_exists(&fx.root, "skipped.txt"));

	monitor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn events_of_one_folder_apply_in_order() {
	let fx = Fixture::new();
	let (monitor, events_tx) = monitor(
		&fx,
		MonitorConfig {
			workers: 4,
			..test_config()
		},
	);
	monitor.bootstrap_roots(&[fx.root.clone()]).await;

	let names = (0..32).map(|i| format!("file-{i}.txt")).collect::<Vec<_>>();
	for name in &names {
		fx.write(name, b"x");
	}

	// Added then Deleted of a file still on disk: only the right order leaves nothing behind
	for name in &names {
		send(&events_tx, WatchEvent::added(fx.path(name)));
		send(&events_tx, WatchEvent::deleted(fx.path(name)));
	}
	let sentinel = fx.write("sentinel.txt", b"x");
	send(&events_tx, WatchEvent::added(&sentinel));

	wait_until(|| monitor.engine().store().file_exists(&fx.root, "sentinel.txt")).await;
	for name in &names {
		assert!(
			!monitor.engine().store().file_exists(&fx.root, name),
			"{name} was handled out of order"
		);
	}

	monitor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn events_inside_a_renamed_folder_wait_for_the_rename() {
	let fx = Fixture::new();
	let inner = MemoryAuthority::new();
	inner.insert_folder(&fx.root);

	let folders = (0..4).map(|i| format!("sub{i}")).collect::<Vec<_>>();
	for folder in &folders {
		let file = fx.write(&format!("{folder}/f.txt"), b"committed");
		inner.insert_folder(fx.path(folder));
		inner.insert_file(&file, Some(checksum_bytes(b"committed")), None);
	}

	// Every authority round trip of the rename leaves room for later events to overtake it
	let (events_tx, events_rx) = chan::unbounded();
	let monitor = FileMonitor::new(
		Arc::clone(&fx.backend) as Arc<dyn WatchBackend>,
		events_rx,
		Arc::new(SlowAuthority {
			inner,
			delay: Duration::from_millis(100),
		}) as Arc<dyn StorageAuthority>,
		MonitorConfig {
			workers: 8,
			authority_timeout_ms: 2_000,
			..test_config()
		},
	);
	monitor.bootstrap_roots(&[fx.root.clone()]).await;
	for folder in &folders {
		assert_eq!(
			monitor.engine().store().file_status(fx.path(folder), "f.txt"),
			Some(ItemStatus::Monitored)
		);
	}

	for folder in &folders {
		let renamed = fx.path(&format!("renamed-{folder}"));
		fs::rename(fx.path(folder), &renamed).unwrap();
		fs::write(renamed.join("f.txt"), b"edited after the rename").unwrap();

		for event in WatchEvent::moved(fx.path(folder), &renamed) {
			events_tx.try_send(event).unwrap();
		}
		send(&events_tx, WatchEvent::modified(renamed.join("f.txt")));
	}

	for folder in &folders {
		let renamed = fx.path(&format!("renamed-{folder}"));
		wait_until(|| {
			monitor.engine().store().file_status(&renamed, "f.txt") == Some(ItemStatus::Updated)
		})
		.await;
		assert_eq!(
			monitor.engine().store().folder_status(&renamed),
			Some(ItemStatus::Renamed)
		);
		assert!(!monitor.engine().store().folder_exists(fx.path(folder)));
	}

	monitor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn shutdown_drains_and_releases_watches() {
	let fx = Fixture::new();
	fx.mkdir("a");
	fx.mkdir("b");
	let (monitor, events_tx) = monitor(&fx, test_config());
	monitor.bootstrap_roots(&[fx.root.clone()]).await;

	fx.mkdir("c");
	send(&events_tx, WatchEvent::added(fx.path("c")));
	wait_until(|| monitor.engine().store().folder_exists(fx.path("c"))).await;
	assert_eq!(
		monitor.engine().store().folder_status(fx.path("c")),
		Some(ItemStatus::NewAdded)
	);
	assert_eq!(monitor.queued_events(), 0);

	assert_eq!(monitor.shutdown().await, 4);
	assert!(fx.backend.live_paths().is_empty());
	assert!(events_tx.try_send(WatchEvent::added(fx.path("d")).unwrap()).is_err());
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn admin_operations_through_the_facade() {
	let fx = Fixture::new();
	let sub = fx.mkdir("sub");
	fx.write("sub/a.txt", b"a");
	let (monitor, _events_tx) = monitor(
		&fx,
		MonitorConfig {
			scan_new_folders: false,
			..test_config()
		},
	);

	assert!(monitor.add_folder(&sub).await);
	assert!(!monitor.engine().store().file_exists(&sub, "a.txt"));
	assert!(monitor.add_file(&sub, "a.txt").await);
	assert!(monitor.commit(sub.join("a.txt")));
	assert_eq!(
		monitor.engine().store().file_status(&sub, "a.txt"),
		Some(ItemStatus::Monitored)
	);

	let summary = monitor.start_monitoring().await.unwrap();
	assert_eq!(summary.roots, 0);

	monitor.shutdown().await;
}
