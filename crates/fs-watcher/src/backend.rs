use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// Opaque token identifying one installed watch.
///
/// Handles are never reused by a backend, so a stale handle can be removed
/// again without touching a newer watch on the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchHandle(u64);

impl WatchHandle {
	#[must_use]
	pub const fn new(id: u64) -> Self {
		Self(id)
	}

	#[must_use]
	pub const fn id(self) -> u64 {
		self.0
	}
}

impl fmt::Display for WatchHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "watch#{}", self.0)
	}
}

/// OS-level directory watching primitive.
///
/// Implementations deliver their events out of band (usually through a channel
/// handed over at construction time); this trait only covers the lifecycle of
/// individual watches.
pub trait WatchBackend: Send + Sync + 'static {
	/// Start watching `path`, only its immediate children unless `recursive` is set.
	fn install_watch(&self, path: &Path, recursive: bool) -> Result<WatchHandle, WatchError>;

	/// Stop the watch behind `handle`. Unknown or already removed handles are a no-op.
	fn remove_watch(&self, handle: WatchHandle);

	/// Point an existing watch at the new location of a renamed directory, keeping its handle.
	fn relocate_watch(&self, handle: WatchHandle, new_path: &Path) -> Result<(), WatchError> {
		let _ = (handle, new_path);
		Ok(())
	}
}
