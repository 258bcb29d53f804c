//! Path helpers shared by the listener, the engine and reporting

use std::{
	fs::Metadata,
	path::{Path, PathBuf, MAIN_SEPARATOR},
};

use crate::error::NonUtf8PathError;

/// Canonical store key: `/a/b/` and `/a/./b` both become `/a/b`
#[must_use]
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
	path.as_ref().components().collect()
}

/// Split a file path into its normalized parent folder and UTF-8 name
pub fn split_file(path: impl AsRef<Path>) -> Result<Option<(PathBuf, String)>, NonUtf8PathError> {
	let path = path.as_ref();

	let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
		return Ok(None);
	};

	let name = name
		.to_str()
		.ok_or_else(|| NonUtf8PathError(path.into()))?
		.to_string();

	Ok(Some((normalize(parent), name)))
}

/// Folders are rendered with a trailing separator
#[must_use]
pub fn folder_display(path: &Path) -> String {
	let mut display = path.display().to_string();
	if !display.ends_with(MAIN_SEPARATOR) {
		display.push(MAIN_SEPARATOR);
	}
	display
}

#[must_use]
pub fn file_display(folder: &Path, name: &str) -> String {
	folder.join(name).display().to_string()
}

#[must_use]
pub fn name_is_hidden(name: &str) -> bool {
	name.starts_with('.')
}

pub fn path_is_hidden(path: impl AsRef<Path>, metadata: &Metadata) -> bool {
	if path
		.as_ref()
		.file_name()
		.and_then(|name| name.to_str())
		.is_some_and(name_is_hidden)
	{
		return true;
	}

	#[cfg(target_os = "macos")]
	{
		use std::os::macos::fs::MetadataExt;

		const UF_HIDDEN: u32 = 0x8000;

		if (metadata.st_flags() & UF_HIDDEN) == UF_HIDDEN {
			return true;
		}
	}

	#[cfg(target_family = "windows")]
	{
		use std::os::windows::fs::MetadataExt;

		const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;

		if (metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN) == FILE_ATTRIBUTE_HIDDEN {
			return true;
		}
	}

	#[cfg(target_os = "linux")]
	let _ = metadata; // just to avoid warnings on Linux

	false
}
