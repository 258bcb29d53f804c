//!
//! # File Monitor Watch Backend
//!
//! Platform-agnostic watch backend that hides notify behind opaque per-folder
//! [`WatchHandle`]s and emits [`WatchEvent`]s in four canonical kinds:
//! - `Added(dir, name)`
//! - `Deleted(dir, name)`
//! - `Modified(dir, name)`
//! - `Moved(dir, old_name, new_name)`
//!
//! Platform quirks (inotify rename cookies, FSEvents single-path renames, modify
//! bursts) are absorbed by the per-platform handlers in [`platform`] before events
//! reach the consumer channel.
//!
//! ## Basic example
//!
//! ```no_run
//! use fm_fs_watcher::{NotifyBackend, WatchBackend, WatchEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fm_fs_watcher::WatchError> {
//!     let (events_tx, events_rx) = async_channel::unbounded::<WatchEvent>();
//!     let backend = NotifyBackend::new(events_tx)?;
//!
//!     let handle = backend.install_watch("/tmp".as_ref(), false)?;
//!
//!     while let Ok(event) = events_rx.recv().await {
//!         println!("{event:?}");
//!     }
//!
//!     backend.remove_watch(handle);
//!     Ok(())
//! }
//! ```

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

mod backend;
mod error;
mod event;
mod notify_backend;
pub mod platform;

pub use backend::{WatchBackend, WatchHandle};
pub use error::{WatchError, WatchErrorKind};
pub use event::{RawEventKind, RawNotifyEvent, WatchEvent};
pub use notify_backend::NotifyBackend;

pub type Result<T> = std::result::Result<T, WatchError>;
