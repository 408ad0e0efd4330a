/// On-disk addressing for the store.
///
/// A store root holds one shared metadata index and one data file per HUC8:
///
/// ```text
/// <root>/site_metadata.json
/// <root>/.index-stale          (present only while the index is behind)
/// <root>/huc/<huc8>.json
/// ```
///
/// Paths are a pure function of the root and the HUC8, so "does this
/// watershed already have a file" is a plain existence check.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::logging::{self, Component};

/// File name of the shared metadata index.
pub const INDEX_FILE_NAME: &str = "site_metadata.json";

/// Marker left behind when a data file was written but the index was not.
pub const STALE_MARKER_NAME: &str = ".index-stale";

/// Directory holding one data file per HUC8.
pub const HUC_DIR_NAME: &str = "huc";

const DATA_FILE_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        if root.as_os_str().is_empty() {
            return Err(StoreError::InvalidLayout("store root path is empty".to_string()));
        }

        if root.exists() && !root.is_dir() {
            return Err(StoreError::InvalidLayout(format!(
                "store root {} exists and is not a directory",
                root.display()
            )));
        }

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                StoreError::InvalidLayout(format!(
                    "cannot create store root {}: {}",
                    root.display(),
                    e
                ))
            })?;
            logging::info(
                Component::Layout,
                None,
                &format!("Created store root {}", root.display()),
            );
        }

        Ok(StoreLayout { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the shared metadata index.
    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    pub fn stale_marker_path(&self) -> PathBuf {
        self.root.join(STALE_MARKER_NAME)
    }

    pub fn huc_dir(&self) -> PathBuf {
        self.root.join(HUC_DIR_NAME)
    }

    /// Path of the data file for `huc`. Every product for the watershed
    /// lives in this one file.
    pub fn data_file_path(&self, huc: &str) -> StoreResult<PathBuf> {
        validate_huc8(huc)?;
        Ok(self.huc_dir().join(format!("{}.{}", huc, DATA_FILE_EXTENSION)))
    }

    /// Resolves the data file and index entry key for a (HUC8, product)
    /// pair. The key is how index rows for that slice are addressed.
    pub fn locate(&self, huc: &str, parm_cd: &str) -> StoreResult<(PathBuf, String)> {
        validate_product(parm_cd)?;
        let path = self.data_file_path(huc)?;
        Ok((path, format!("{}/{}", huc, parm_cd)))
    }

    pub fn has_data_file(&self, huc: &str) -> StoreResult<bool> {
        Ok(self.data_file_path(huc)?.is_file())
    }

    pub fn index_is_stale(&self) -> bool {
        self.stale_marker_path().exists()
    }

    /// HUC8 codes that currently have a data file, sorted.
    ///
    /// Files in the HUC directory that do not look like data files (staging
    /// leftovers, editor backups) are skipped.
    pub fn list_hucs(&self) -> StoreResult<Vec<String>> {
        let dir = self.huc_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| StoreError::persistence(&dir, e))?;
        let mut hucs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::persistence(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DATA_FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_huc8(stem) && path.is_file() {
                    hucs.push(stem.to_string());
                }
            }
        }
        hucs.sort();
        Ok(hucs)
    }
}

fn is_huc8(code: &str) -> bool {
    code.len() == 8 && code.chars().all(|c| c.is_ascii_digit())
}

/// Checks that `huc` is an 8-digit watershed code.
pub fn validate_huc8(huc: &str) -> StoreResult<()> {
    if is_huc8(huc) {
        Ok(())
    } else {
        Err(StoreError::InvalidLayout(format!(
            "HUC8 code must be 8 digits, got '{}'",
            huc
        )))
    }
}

/// Checks that `parm_cd` is a 5-digit USGS parameter code.
pub fn validate_product(parm_cd: &str) -> StoreResult<()> {
    if parm_cd.len() == 5 && parm_cd.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(StoreError::InvalidLayout(format!(
            "product code must be 5 digits, got '{}'",
            parm_cd
        )))
    }
}
