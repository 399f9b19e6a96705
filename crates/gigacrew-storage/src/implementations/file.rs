//! File-based storage backend.
//!
//! Each key is stored as one file under the base directory. Keys are
//! percent-encoded so that listing the directory gives the original keys
//! back.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

const EXTENSION: &str = "json";

pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		self.base_path
			.join(format!("{}.{}", encode_key(key), EXTENSION))
	}
}

fn encode_key(key: &str) -> String {
	urlencoding::encode(key).into_owned()
}

fn decode_key(encoded: &str) -> Option<String> {
	urlencoding::decode(encoded).ok().map(|key| key.into_owned())
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		// Atomic replace
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let file_name = entry.file_name();
			let Some(name) = file_name.to_str() else {
				continue;
			};
			let Some(stem) = name.strip_suffix(&format!(".{}", EXTENSION)) else {
				continue;
			};
			if let Some(key) = decode_key(stem) {
				if key.starts_with(prefix) {
					keys.push(key);
				}
			}
		}
		keys.sort();
		Ok(keys)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_key_encoding_is_reversible() {
		for key in ["orders:12", "sync:checkpoint:catalog", "a/b c"] {
			let encoded = encode_key(key);
			assert!(!encoded.contains(':') && !encoded.contains('/'));
			assert_eq!(decode_key(&encoded).as_deref(), Some(key));
		}
	}

	#[tokio::test]
	async fn test_file_storage_lists_by_prefix() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage.set_bytes("orders:1", b"1".to_vec()).await.unwrap();
		storage.set_bytes("orders:2", b"2".to_vec()).await.unwrap();
		storage.set_bytes("services:1", b"3".to_vec()).await.unwrap();

		assert_eq!(
			storage.keys("orders:").await.unwrap(),
			vec!["orders:1".to_string(), "orders:2".to_string()]
		);
		assert_eq!(storage.get_bytes("services:1").await.unwrap(), b"3");

		storage.delete("orders:1").await.unwrap();
		assert!(!storage.exists("orders:1").await.unwrap());
		assert!(matches!(
			storage.get_bytes("orders:1").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_missing_directory_lists_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().join("absent"));
		assert!(storage.keys("").await.unwrap().is_empty());
	}
}
