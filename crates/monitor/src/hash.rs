use std::{path::Path, time::Duration};

use blake3::Hasher;
use chrono::{DateTime, Utc};
use tokio::{fs::File, io::AsyncReadExt};

use crate::error::FileIOError;

const BLOCK_LEN: usize = 1_048_576;

/// blake3 of the file content as lowercase hex
pub async fn file_checksum(path: impl AsRef<Path>) -> Result<String, FileIOError> {
	let path = path.as_ref();

	let mut reader = File::open(path)
		.await
		.map_err(|e| FileIOError::from((path, e, "opening file to hash")))?;
	let mut context = Hasher::new();
	let mut buffer = vec![0; BLOCK_LEN].into_boxed_slice();

	loop {
		let read_count = reader
			.read(&mut buffer)
			.await
			.map_err(|e| FileIOError::from((path, e, "reading file to hash")))?;
		if read_count == 0 {
			break;
		}
		context.update(&buffer[..read_count]);
	}

	Ok(context.finalize().to_hex().to_string())
}

#[must_use]
pub fn checksum_bytes(bytes: &[u8]) -> String {
	blake3::hash(bytes).to_hex().to_string()
}

/// Timestamps closer than `tolerance` count as the same instant
#[must_use]
pub fn timestamps_match(a: DateTime<Utc>, b: DateTime<Utc>, tolerance: Duration) -> bool {
	(a - b)
		.abs()
		.to_std()
		.is_ok_and(|difference| difference <= tolerance)
}

#[cfg(test)]
mod tests {
	use chrono::TimeDelta;

	use super::*;

	#[tokio::test]
	async fn checksum_matches_in_memory_hash() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("a.txt");
		tokio::fs::write(&path, b"hello world").await.unwrap();

		assert_eq!(
			file_checksum(&path).await.unwrap(),
			checksum_bytes(b"hello world")
		);
	}

	#[tokio::test]
	async fn missing_file_fails_with_path() {
		let dir = tempfile::tempdir().unwrap();
		let error = file_checksum(dir.path().join("gone.txt")).await.unwrap_err();
		assert!(error.path.ends_with("gone.txt"));
	}

	#[test]
	fn tolerance_applies_both_ways() {
		let now = Utc::now();
		let tolerance = Duration::from_secs(1);

		assert!(timestamps_match(now, now + TimeDelta::milliseconds(900), tolerance));
		assert!(timestamps_match(now + TimeDelta::milliseconds(900), now, tolerance));
		assert!(!timestamps_match(now, now + TimeDelta::seconds(2), tolerance));
	}
}
