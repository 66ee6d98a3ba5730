//! Directory-backed storage.

use crate::error::StorageError;
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::storage::Storage;

/// Magic bytes for item files.
const ITEM_MAGIC: &[u8; 4] = b"SBI\0";

/// Current item format version.
const ITEM_VERSION: u8 = 1;

/// Persistent storage with one file per key.
///
/// Files live under `<shard>/<sha256(key)>`, where the shard is the first
/// byte of the digest in hex. Each file holds the key, the value and a
/// CRC32 over both. The directory is locked for the lifetime of the
/// storage, so only one process uses it at a time.
pub struct FileStorage {
    /// Base directory.
    path: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// LRU cache for recently read values.
    cache: Mutex<LruCache<String, String>>,
}

impl FileStorage {
    /// Open (creating if needed) storage at `path`.
    pub fn open(path: impl AsRef<Path>, cache_size: usize) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StorageError::Locked)?;

        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        debug!(path = %path.display(), "file storage opened");

        Ok(Self {
            path,
            _lock_file: lock_file,
            cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored key, in no particular order.
    pub fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            for item in fs::read_dir(entry.path())? {
                let item = item?;
                if item.path().extension().is_some() {
                    continue;
                }
                let (key, _) = read_item(&item.path())?;
                keys.push(key);
            }
        }

        Ok(keys)
    }

    fn digest(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    /// Get the shard directory for a key.
    fn shard_path(&self, digest: &str) -> PathBuf {
        self.path.join(&digest[..2])
    }

    /// Get the full path for a key.
    fn item_path(&self, key: &str) -> PathBuf {
        let digest = Self::digest(key);
        self.shard_path(&digest).join(digest)
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        // Check cache first
        if let Some(cached) = self.cache.lock().get(key).cloned() {
            return Ok(Some(cached));
        }

        let item_path = self.item_path(key);
        if !item_path.exists() {
            return Ok(None);
        }

        let (stored_key, value) = read_item(&item_path)?;
        if stored_key != key {
            return Err(StorageError::Corruption(format!(
                "item file for {key:?} holds {stored_key:?}"
            )));
        }

        self.cache.lock().put(key.to_string(), value.clone());
        Ok(Some(value))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let item_path = self.item_path(key);
        if let Some(shard_dir) = item_path.parent() {
            fs::create_dir_all(shard_dir)?;
        }

        // Write beside the target, then rename over it
        let tmp_path = item_path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            write_item(&mut file, key, value)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &item_path)?;

        self.cache.lock().put(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.cache.lock().pop(key);

        match fs::remove_file(self.item_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_item(file: &mut File, key: &str, value: &str) -> Result<(), StorageError> {
    // Write header
    file.write_all(ITEM_MAGIC)?;
    file.write_all(&[ITEM_VERSION])?;

    // Write key
    let key_bytes = key.as_bytes();
    file.write_all(&(key_bytes.len() as u32).to_le_bytes())?;
    file.write_all(key_bytes)?;

    // Write value
    let value_bytes = value.as_bytes();
    file.write_all(&(value_bytes.len() as u64).to_le_bytes())?;
    file.write_all(value_bytes)?;

    // Write checksum
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key_bytes);
    hasher.update(value_bytes);
    file.write_all(&hasher.finalize().to_le_bytes())?;

    Ok(())
}

/// Magic, version, both length fields and the checksum.
const ITEM_OVERHEAD: u64 = 4 + 1 + 4 + 8 + 4;

/// Take `len` bytes out of `remaining`, failing if the file is too short.
fn claim(remaining: &mut u64, len: u64, field: &str) -> Result<usize, StorageError> {
    if len > *remaining {
        return Err(StorageError::Corruption(format!(
            "item {field} length {len} exceeds the {remaining} bytes left"
        )));
    }
    *remaining -= len;
    usize::try_from(len)
        .map_err(|_| StorageError::Corruption(format!("item {field} length {len} too large")))
}

fn read_item(path: &Path) -> Result<(String, String), StorageError> {
    let mut file = File::open(path)?;

    // Read and verify magic
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != ITEM_MAGIC {
        return Err(StorageError::InvalidFormat("Invalid item magic".into()));
    }

    // Read version
    let mut version = [0u8; 1];
    file.read_exact(&mut version)?;
    if version[0] != ITEM_VERSION {
        return Err(StorageError::InvalidFormat(format!(
            "Unsupported item version: {}",
            version[0]
        )));
    }

    // Bytes left for key and value once every fixed-size field is read
    let mut remaining = file.metadata()?.len().saturating_sub(ITEM_OVERHEAD);

    // Read key
    let mut key_len_bytes = [0u8; 4];
    file.read_exact(&mut key_len_bytes)?;
    let key_len = claim(&mut remaining, u32::from_le_bytes(key_len_bytes).into(), "key")?;
    let mut key_bytes = vec![0u8; key_len];
    file.read_exact(&mut key_bytes)?;

    // Read value
    let mut value_len_bytes = [0u8; 8];
    file.read_exact(&mut value_len_bytes)?;
    let value_len = claim(&mut remaining, u64::from_le_bytes(value_len_bytes), "value")?;
    let mut value_bytes = vec![0u8; value_len];
    file.read_exact(&mut value_bytes)?;

    // Read and verify checksum
    let mut checksum_bytes = [0u8; 4];
    file.read_exact(&mut checksum_bytes)?;
    let stored_checksum = u32::from_le_bytes(checksum_bytes);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&key_bytes);
    hasher.update(&value_bytes);
    let computed_checksum = hasher.finalize();

    if stored_checksum != computed_checksum {
        return Err(StorageError::ChecksumMismatch {
            expected: stored_checksum,
            got: computed_checksum,
        });
    }

    let key = String::from_utf8(key_bytes)
        .map_err(|e| StorageError::Corruption(format!("item key is not UTF-8: {e}")))?;
    let value = String::from_utf8(value_bytes)
        .map_err(|e| StorageError::Corruption(format!("item value is not UTF-8: {e}")))?;

    Ok((key, value))
}
