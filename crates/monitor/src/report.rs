use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
	error::MonitoringError,
	path::{file_display, folder_display},
	status::ItemStatus,
	store::StoreSnapshot,
};

/// Where a renamed item was when its episode started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameEntry {
	pub previous: String,
	pub current: String,
}

/// Pending changes grouped by status, as handed to sync clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
	pub updated_file_list: Vec<String>,
	pub deleted_file_list: Vec<String>,
	pub renamed_file_list: Vec<String>,
	pub new_added_file_list: Vec<String>,
	pub updated_and_renamed_file_list: Vec<String>,
	pub missing_file_list: Vec<String>,
	pub new_added_folder_list: Vec<String>,
	pub updated_folder_list: Vec<String>,
	pub deleted_folder_list: Vec<String>,
	pub renamed_folder_list: Vec<String>,
	pub renames: Vec<RenameEntry>,
	pub errors: Vec<MonitoringError>,
}

impl StatusReport {
	#[must_use]
	pub fn from_snapshot(snapshot: &StoreSnapshot) -> Self {
		let mut report = Self {
			missing_file_list: snapshot
				.missing
				.iter()
				.map(|path| path.display().to_string())
				.collect(),
			errors: snapshot.errors.clone(),
			..Default::default()
		};

		for (path, folder) in &snapshot.folders {
			let display = folder_display(path);

			if let Some(previous) = &folder.previous_path {
				report.renames.push(RenameEntry {
					previous: folder_display(previous),
					current: display.clone(),
				});
			}

			match folder.status {
				ItemStatus::NewAdded => report.new_added_folder_list.push(display),
				ItemStatus::Updated => report.updated_folder_list.push(display),
				ItemStatus::Deleted => report.deleted_folder_list.push(display),
				ItemStatus::Renamed => report.renamed_folder_list.push(display),
				_ => {}
			}
		}

		for (folder, files) in &snapshot.files {
			for (name, file) in files {
				let display = file_display(folder, name);

				if let Some(previous) = &file.previous_name {
					report.renames.push(RenameEntry {
						previous: file_display(folder, previous),
						current: display.clone(),
					});
				}

				match file.status {
					ItemStatus::Updated => report.updated_file_list.push(display),
					ItemStatus::Deleted => report.deleted_file_list.push(display),
					ItemStatus::Renamed => report.renamed_file_list.push(display),
					ItemStatus::NewAdded => report.new_added_file_list.push(display),
					ItemStatus::UpdatedAndRenamed => {
						report.updated_and_renamed_file_list.push(display);
					}
					ItemStatus::Missing => report.missing_file_list.push(display),
					ItemStatus::Monitored => {}
				}
			}
		}

		report.missing_file_list = report.missing_file_list.into_iter().sorted().dedup().collect();

		report
	}

	/// Nothing waits to be committed
	#[must_use]
	pub fn is_clean(&self) -> bool {
		self.updated_file_list.is_empty()
			&& self.deleted_file_list.is_empty()
			&& self.renamed_file_list.is_empty()
			&& self.new_added_file_list.is_empty()
			&& self.updated_and_renamed_file_list.is_empty()
			&& self.new_added_folder_list.is_empty()
			&& self.updated_folder_list.is_empty()
			&& self.deleted_folder_list.is_empty()
			&& self.renamed_folder_list.is_empty()
	}
}
