//!
//! # File Monitor
//!
//! Reconciles watch events against a [`StorageAuthority`] and keeps a pending
//! status per tracked folder and file in a [`StatusStore`].
//!
//! Events flow `WatchBackend -> EventListener -> Dispatcher -> Engine`. The
//! listener drops events while paused and turns `dir + name` pairs into paths,
//! the dispatcher shards them by directory so events about one path are applied
//! in delivery order, and the [`Engine`] applies the status rules.
//!
//! [`FileMonitor`] wires everything together and is what the server talks to.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod authority;
pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod hash;
pub mod listener;
pub mod monitor;
pub mod path;
pub mod report;
pub mod status;
pub mod store;

pub use authority::{ActiveFolder, MemoryAuthority, StorageAuthority, StorageFacts};
pub use bootstrap::BootstrapSummary;
pub use config::{ChangeDetection, MonitorConfig};
pub use engine::Engine;
pub use error::{
	AuthorityError, ErrorContext, FileIOError, MonitorError, MonitoringError, NonUtf8PathError,
};
pub use listener::FsEvent;
pub use monitor::FileMonitor;
pub use report::{RenameEntry, StatusReport};
pub use status::{ItemKind, ItemStatus};
pub use store::StatusStore;
