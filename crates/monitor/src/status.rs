use serde::{Deserialize, Serialize};

/// Pending change status of a tracked item
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	PartialOrd,
	Ord,
	Serialize,
	Deserialize,
	strum::Display,
	strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ItemStatus {
	/// In sync with the storage authority
	Monitored,
	/// Never committed
	NewAdded,
	Updated,
	Renamed,
	/// Files only
	UpdatedAndRenamed,
	Deleted,
	/// Configured but not found on disk, reporting only
	Missing,
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ItemKind {
	Folder,
	File,
}

impl ItemStatus {
	#[must_use]
	pub const fn is_pending(self) -> bool {
		!matches!(self, Self::Monitored)
	}

	/// Whether a folder row may hold this status
	#[must_use]
	pub const fn applies_to_folders(self) -> bool {
		!matches!(self, Self::UpdatedAndRenamed | Self::Missing)
	}

	/// Status of a file whose content changed
	#[must_use]
	pub const fn after_update(self) -> Self {
		match self {
			Self::NewAdded => Self::NewAdded,
			Self::Renamed | Self::UpdatedAndRenamed => Self::UpdatedAndRenamed,
			_ => Self::Updated,
		}
	}

	/// Status of a file that got a new name
	#[must_use]
	pub const fn after_file_rename(self) -> Self {
		match self {
			Self::NewAdded => Self::NewAdded,
			Self::Updated | Self::UpdatedAndRenamed => Self::UpdatedAndRenamed,
			_ => Self::Renamed,
		}
	}

	#[must_use]
	pub const fn after_folder_rename(self) -> Self {
		match self {
			Self::NewAdded => Self::NewAdded,
			_ => Self::Renamed,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::str::FromStr;

	use super::*;

	#[test]
	fn rename_after_update_combines() {
		assert_eq!(
			ItemStatus::Updated.after_file_rename(),
			ItemStatus::UpdatedAndRenamed
		);
		assert_eq!(
			ItemStatus::Renamed.after_update(),
			ItemStatus::UpdatedAndRenamed
		);
		assert_eq!(ItemStatus::Monitored.after_file_rename(), ItemStatus::Renamed);
		assert_eq!(ItemStatus::Renamed.after_file_rename(), ItemStatus::Renamed);
	}

	#[test]
	fn uncommitted_items_stay_new() {
		assert_eq!(ItemStatus::NewAdded.after_update(), ItemStatus::NewAdded);
		assert_eq!(ItemStatus::NewAdded.after_file_rename(), ItemStatus::NewAdded);
		assert_eq!(ItemStatus::NewAdded.after_folder_rename(), ItemStatus::NewAdded);
		assert_eq!(ItemStatus::Updated.after_folder_rename(), ItemStatus::Renamed);
	}

	#[test]
	fn names_are_camel_case() {
		assert_eq!(ItemStatus::UpdatedAndRenamed.to_string(), "updatedAndRenamed");
		assert_eq!(
			ItemStatus::from_str("newAdded").unwrap(),
			ItemStatus::NewAdded
		);
		assert_eq!(
			serde_json::to_string(&ItemStatus::NewAdded).unwrap(),
			"\"newAdded\""
		);
		assert!(!ItemStatus::Missing.applies_to_folders());
	}
}
