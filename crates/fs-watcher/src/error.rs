use std::{io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::WatchHandle;

/// Linux returns `ENOSPC` when `fs.inotify.max_user_watches` is exhausted
const ENOSPC: i32 = 28;

#[derive(Debug, Error)]
pub enum WatchError {
	#[error("path not found: <path='{}'>", .0.display())]
	NotFound(PathBuf),
	#[error("permission denied: <path='{}'>", .0.display())]
	PermissionDenied(PathBuf),
	#[error("watch limit reached: <path='{}'>", .0.display())]
	LimitReached(PathBuf),
	#[error("unknown watch handle: {0}")]
	UnknownHandle(WatchHandle),
	#[error("watch backend error: <path='{}'>: {source}", .path.display())]
	Backend {
		path: PathBuf,
		#[source]
		source: notify::Error,
	},
}

/// Serializable classification of a [`WatchError`], used when failures are
/// recorded instead of propagated.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	Serialize,
	Deserialize,
	strum::Display,
	strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum WatchErrorKind {
	NotFound,
	PermissionDenied,
	LimitReached,
	Generic,
}

impl WatchError {
	/// Classify a notify error raised while operating on `path`
	pub fn from_notify(path: impl Into<PathBuf>, error: notify::Error) -> Self {
		let path = path.into();

		let kind = match &error.kind {
			notify::ErrorKind::PathNotFound => WatchErrorKind::NotFound,
			notify::ErrorKind::MaxFilesWatch => WatchErrorKind::LimitReached,
			notify::ErrorKind::Io(e) => match e.kind() {
				io::ErrorKind::NotFound => WatchErrorKind::NotFound,
				io::ErrorKind::PermissionDenied => WatchErrorKind::PermissionDenied,
				_ if e.raw_os_error() == Some(ENOSPC) => WatchErrorKind::LimitReached,
				_ => WatchErrorKind::Generic,
			},
			_ => WatchErrorKind::Generic,
		};

		match kind {
			WatchErrorKind::NotFound => Self::NotFound(path),
			WatchErrorKind::PermissionDenied => Self::PermissionDenied(path),
			WatchErrorKind::LimitReached => Self::LimitReached(path),
			WatchErrorKind::Generic => Self::Backend {
				path,
				source: error,
			},
		}
	}

	#[must_use]
	pub const fn kind(&self) -> WatchErrorKind {
		match self {
			Self::NotFound(_) => WatchErrorKind::NotFound,
			Self::PermissionDenied(_) => WatchErrorKind::PermissionDenied,
			Self::LimitReached(_) => WatchErrorKind::LimitReached,
			Self::UnknownHandle(_) | Self::Backend { .. } => WatchErrorKind::Generic,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_io_errors() {
		let not_found = WatchError::from_notify(
			"/missing",
			notify::Error::io(io::Error::from(io::ErrorKind::NotFound)),
		);
		assert_eq!(not_found.kind(), WatchErrorKind::NotFound);

		let denied = WatchError::from_notify(
			"/root",
			notify::Error::io(io::Error::from(io::ErrorKind::PermissionDenied)),
		);
		assert_eq!(denied.kind(), WatchErrorKind::PermissionDenied);

		let exhausted = WatchError::from_notify(
			"/data",
			notify::Error::io(io::Error::from_raw_os_error(ENOSPC)),
		);
		assert_eq!(exhausted.kind(), WatchErrorKind::LimitReached);
	}

	#[test]
	fn classifies_notify_kinds() {
		let missing = WatchError::from_notify("/gone", notify::Error::path_not_found());
		assert!(matches!(missing, WatchError::NotFound(ref p) if p.as_path() == std::path::Path::new("/gone")));

		let generic = WatchError::from_notify("/x", notify::Error::generic("boom"));
		assert_eq!(generic.kind(), WatchErrorKind::Generic);
		assert_eq!(generic.kind().to_string(), "generic");
	}
}
