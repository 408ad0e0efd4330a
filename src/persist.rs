//! JSON file I/O shared by the index and the per-HUC data files.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};

/// Staging path for `path`: same directory, so the final rename never
/// crosses a filesystem.
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serializes `value` as pretty JSON and replaces `path` with it.
///
/// The bytes go to a staging file which is fsynced and then renamed over the
/// target, so readers see either the old file or the new one.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::corrupt(path, e))?;
    bytes.push(b'\n');

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::persistence(parent, e))?;
    }

    let temp_path = staging_path(path);
    {
        let mut file = File::create(&temp_path).map_err(|e| StoreError::persistence(&temp_path, e))?;
        file.write_all(&bytes).map_err(|e| StoreError::persistence(&temp_path, e))?;
        // Flush to disk before the rename makes it visible
        file.sync_all().map_err(|e| StoreError::persistence(&temp_path, e))?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::persistence(path, e));
    }
    Ok(())
}

/// Reads and decodes a JSON file. Returns `Ok(None)` if it does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::persistence(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::corrupt(path, e))
}
