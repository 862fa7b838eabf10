//! Directory-backed durable storage.
//!
//! One file per key. File names are the URL-safe base64 of the key so any
//! string can be stored; files whose names do not decode are foreign and ignored.
//!
//! Keys whose encoded name would not fit the filesystem's name limit are
//! stored under the SHA-256 of the key instead. Those files start with a
//! header line holding the encoded key, so listing can recover it.

use std::fs;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{record_size, StorageBackend, StorageUsage};
use crate::error::StorageError;

const RECORD_EXT: &str = "rec";
const HASHED_EXT: &str = "hrec";
const TEMP_EXT: &str = "tmp";

/// Longest file name most filesystems accept
const MAX_NAME_LEN: usize = 255;

/// Where a key's record lives on disk.
#[derive(Debug)]
struct RecordFile {
    path: PathBuf,
    /// Header line written before the record, for digest-named files
    header: Option<String>,
}

impl RecordFile {
    fn header_len(&self) -> u64 {
        self.header.as_ref().map_or(0, |h| h.len() as u64)
    }
}

/// Durable store rooted at a directory, with an optional byte quota.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    quota_bytes: Option<u64>,
    /// Serializes writers so quota checks and renames don't interleave
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Opens (creating if needed) a store in `dir`.
    pub fn open(dir: impl Into<PathBuf>, quota_bytes: Option<u64>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            quota_bytes,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_file(&self, key: &str) -> RecordFile {
        let encoded = URL_SAFE_NO_PAD.encode(key);
        if encoded.len() + RECORD_EXT.len() + 1 <= MAX_NAME_LEN {
            return RecordFile {
                path: self.dir.join(format!("{}.{}", encoded, RECORD_EXT)),
                header: None,
            };
        }

        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        RecordFile {
            path: self.dir.join(format!("{}.{}", digest, HASHED_EXT)),
            header: Some(format!("{}\n", encoded)),
        }
    }

    /// Recovers the key a record file belongs to.
    fn key_from_path(path: &Path) -> Option<String> {
        let ext = path.extension()?;
        let encoded = if ext == RECORD_EXT {
            path.file_stem()?.to_str()?.to_string()
        } else if ext == HASHED_EXT {
            read_header(path)?
        } else {
            return None;
        };
        let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        String::from_utf8(bytes).ok()
    }

    fn records(&self) -> Result<Vec<(String, PathBuf)>, StorageError> {
        let mut out = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            match Self::key_from_path(&path) {
                Some(key) => out.push((key, path)),
                None => debug!("Ignoring foreign file {}", path.display()),
            }
        }
        Ok(out)
    }

    fn used_bytes(&self) -> Result<(u64, usize), StorageError> {
        let mut used = 0;
        let records = self.records()?;
        for (key, path) in &records {
            used += self.stored_size(key, path)?;
        }
        Ok((used, records.len()))
    }

    /// Quota size of a stored record; digest headers are not charged.
    fn stored_size(&self, key: &str, path: &Path) -> Result<u64, StorageError> {
        let header = self.record_file(key).header_len();
        Ok(key.len() as u64 + file_len(path)?.saturating_sub(header))
    }
}

/// Reads the encoded key line at the top of a digest-named file.
fn read_header(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    line.strip_suffix('\n').map(str::to_string)
}

fn file_len(path: &Path) -> Result<u64, StorageError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

impl StorageBackend for FileStorage {
    fn name(&self) -> &'static str {
        "file-storage"
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let file = self.record_file(key);
        let bytes = match fs::read(&file.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        // Non-UTF-8 content is handed up as-is so decoding rejects it
        let content = String::from_utf8_lossy(&bytes).into_owned();

        match file.header {
            None => Ok(Some(content)),
            Some(header) => match content.strip_prefix(header.as_str()) {
                Some(raw) => Ok(Some(raw.to_string())),
                None => {
                    warn!(
                        "{}: {} does not hold the requested key",
                        self.name(),
                        file.path.display()
                    );
                    Ok(None)
                }
            },
        }
    }

    fn write(&self, key: &str, raw: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let file = self.record_file(key);
        let path = &file.path;

        if let Some(quota) = self.quota_bytes {
            let (used, _) = self.used_bytes()?;
            let replaced = if path.exists() {
                self.stored_size(key, path)?
            } else {
                0
            };
            let used = used.saturating_sub(replaced);
            let needed = record_size(key, raw);
            if used + needed > quota {
                return Err(StorageError::QuotaExceeded {
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }

        // Write-then-rename keeps the old record intact if anything fails midway
        let tmp = path.with_extension(TEMP_EXT);
        let contents = match &file.header {
            Some(header) => format!("{}{}", header, raw),
            None => raw.to_string(),
        };
        fs::write(&tmp, contents.as_bytes())?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.record_file(key).path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.records()?.into_iter().map(|(key, _)| key).collect())
    }

    fn usage(&self) -> Result<StorageUsage, StorageError> {
        let (used_bytes, entry_count) = self.used_bytes()?;
        Ok(StorageUsage {
            used_bytes,
            entry_count,
            quota_bytes: self.quota_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    fn create_test_storage(quota: Option<u64>) -> (FileStorage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = FileStorage::open(temp_dir.path(), quota).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_write_and_read() {
        let (storage, _dir) = create_test_storage(None);

        assert_ok!(storage.write("tabcache:profile", "{\"v\":1}"));
        assert_eq!(
            storage.read("tabcache:profile").unwrap().as_deref(),
            Some("{\"v\":1}")
        );
    }

    #[test]
    fn test_read_missing() {
        let (storage, _dir) = create_test_storage(None);
        assert!(storage.read("missing").unwrap().is_none());
    }

    #[test]
    fn test_keys_with_path_characters() {
        let (storage, _dir) = create_test_storage(None);

        storage.write("../../etc/passwd", "x").unwrap();
        storage.write("a/b c", "y").unwrap();

        let mut keys = storage.list_keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["../../etc/passwd".to_string(), "a/b c".to_string()]);
    }

    #[test]
    fn test_foreign_files_are_ignored() {
        let (storage, dir) = create_test_storage(None);

        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        storage.write("k", "v").unwrap();

        assert_eq!(storage.list_keys().unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (storage, _dir) = create_test_storage(None);

        storage.write("k", "v").unwrap();
        assert_ok!(storage.delete("k"));
        assert_ok!(storage.delete("k"));
        assert!(storage.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_quota_exceeded_keeps_previous_record() {
        let (storage, _dir) = create_test_storage(Some(16));

        storage.write("k", "small").unwrap();
        let result = storage.write("k", "this value is far too large");
        assert!(matches!(result, Err(StorageError::QuotaExceeded { .. })));

        assert_eq!(storage.read("k").unwrap().as_deref(), Some("small"));
    }

    #[test]
    fn test_long_key_uses_digest_name() {
        let (storage, dir) = create_test_storage(Some(10_000));
        let key = format!("tabcache:{}", "report/".repeat(43));
        assert!(key.len() > MAX_NAME_LEN);

        assert_ok!(storage.write(&key, "{\"v\":1}"));
        assert_eq!(storage.read(&key).unwrap().as_deref(), Some("{\"v\":1}"));
        assert_eq!(storage.list_keys().unwrap(), vec![key.clone()]);

        // The header line is not charged against the quota
        let usage = storage.usage().unwrap();
        assert_eq!(usage.used_bytes, record_size(&key, "{\"v\":1}"));

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".hrec"));
        assert!(names[0].len() <= MAX_NAME_LEN);

        assert_ok!(storage.delete(&key));
        assert!(storage.read(&key).unwrap().is_none());
        assert!(storage.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_digest_file_with_wrong_header_is_not_served() {
        let (storage, _dir) = create_test_storage(None);
        let key = "k".repeat(300);
        storage.write(&key, "v").unwrap();

        let path = storage.record_file(&key).path;
        fs::write(&path, "bm90LXRoZS1rZXk\nv").unwrap();

        assert!(storage.read(&key).unwrap().is_none());
    }

    #[test]
    fn test_usage_and_reopen() {
        let (storage, dir) = create_test_storage(Some(1_000));
        storage.write("ab", "cde").unwrap();

        let usage = storage.usage().unwrap();
        assert_eq!(usage.used_bytes, 5);
        assert_eq!(usage.entry_count, 1);

        let reopened = FileStorage::open(dir.path(), None).unwrap();
        assert_eq!(reopened.read("ab").unwrap().as_deref(), Some("cde"));
    }
}
