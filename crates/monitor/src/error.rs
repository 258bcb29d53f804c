use std::{
	fmt::{self, Display},
	io,
	path::{Path, PathBuf},
	time::Duration,
};

use chrono::{DateTime, Utc};
use fm_fs_watcher::{WatchError, WatchErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
	#[error(transparent)]
	Watch(#[from] WatchError),
	#[error(transparent)]
	Authority(#[from] AuthorityError),
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error(transparent)]
	NonUtf8Path(#[from] NonUtf8PathError),
	#[error("invalid storage manifest: {0}")]
	Manifest(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Error)]
pub enum AuthorityError {
	#[error("storage authority unavailable: {0}")]
	Unavailable(String),
	#[error("storage authority did not answer within {0:?}")]
	Timeout(Duration),
}

/// File I/O error that includes the path that caused the error
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<&'static str>,
}

impl Display for FileIOError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"file I/O error{}: {}; path: '{}'",
			self.maybe_context
				.map(|ctx| format!(" ({ctx})"))
				.unwrap_or_default(),
			self.source,
			self.path.display()
		)
	}
}

impl<P: AsRef<Path>> From<(P, io::Error)> for FileIOError {
	fn from((path, source): (P, io::Error)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: None,
		}
	}
}

impl<P: AsRef<Path>> From<(P, io::Error, &'static str)> for FileIOError {
	fn from((path, source, context): (P, io::Error, &'static str)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(context),
		}
	}
}

/// Error for paths that contain non-UTF8 characters
#[derive(Error, Debug)]
#[error("received a non UTF-8 path: <path='{}'>", .0.display())]
pub struct NonUtf8PathError(pub Box<Path>);

/// Where a recorded watch failure happened
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum ErrorContext {
	Initialization,
	Discovery,
	AddEvent,
}

/// Watch failure kept for reporting instead of being raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringError {
	pub path: PathBuf,
	pub context: ErrorContext,
	pub kind: WatchErrorKind,
	pub message: String,
	pub recorded_at: DateTime<Utc>,
}

impl MonitoringError {
	pub fn new(
		path: impl Into<PathBuf>,
		context: ErrorContext,
		kind: WatchErrorKind,
		message: impl Into<String>,
	) -> Self {
		Self {
			path: path.into(),
			context,
			kind,
			message: message.into(),
			recorded_at: Utc::now(),
		}
	}

	pub fn from_watch(path: impl Into<PathBuf>, context: ErrorContext, error: &WatchError) -> Self {
		Self::new(path, context, error.kind(), error.to_string())
	}

	pub fn from_io(path: impl Into<PathBuf>, context: ErrorContext, error: &io::Error) -> Self {
		let kind = match error.kind() {
			io::ErrorKind::NotFound => WatchErrorKind::NotFound,
			io::ErrorKind::PermissionDenied => WatchErrorKind::PermissionDenied,
			_ => WatchErrorKind::Generic,
		};

		Self::new(path, context, kind, error.to_string())
	}
}
