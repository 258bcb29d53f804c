use std::{num::NonZeroUsize, path::PathBuf, thread, time::Duration};

use serde::{Deserialize, Serialize};

/// How a modify event decides whether content really changed
#[derive(
	Debug,
	Clone,
	Copy,
	Default,
	PartialEq,
	Eq,
	Serialize,
	Deserialize,
	strum::Display,
	strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeDetection {
	/// blake3 of the content against the last committed hash
	#[default]
	Hash,
	/// Modification time against the last committed timestamp
	Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
	/// Folders or files watched at bootstrap
	pub roots: Vec<PathBuf>,
	/// Number of dispatcher shards
	pub workers: usize,
	pub authority_timeout_ms: u64,
	pub change_detection: ChangeDetection,
	pub timestamp_tolerance_ms: u64,
	/// Walk folders that show up through an Added event
	pub scan_new_folders: bool,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			roots: vec![],
			workers: thread::available_parallelism().map_or(4, NonZeroUsize::get),
			authority_timeout_ms: 2_000,
			change_detection: ChangeDetection::default(),
			timestamp_tolerance_ms: 1_000,
			scan_new_folders: true,
		}
	}
}

impl MonitorConfig {
	#[must_use]
	pub const fn authority_timeout(&self) -> Duration {
		Duration::from_millis(self.authority_timeout_ms)
	}

	#[must_use]
	pub const fn timestamp_tolerance(&self) -> Duration {
		Duration::from_millis(self.timestamp_tolerance_ms)
	}

	#[must_use]
	pub fn workers(&self) -> usize {
		self.workers.max(1)
	}
}
