/// Folding fetched watershed data into the store.
///
/// # Commit order
/// A save touches two files: the HUC data file and the shared index. They
/// are written in that order, each through a staging file and a rename.
/// Before the data file is written a stale-index marker is dropped in the
/// store root; it is removed only after the index has been written. If the
/// index write fails the save returns the error and the marker stays, so the
/// next save (or [`rebuild_index`]) regenerates the index from the data
/// files and queries rebuild it in memory until then.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use crate::error::{StoreError, StoreResult};
use crate::hucfile::{HucDataFile, ProductEntry};
use crate::index::MetadataIndex;
use crate::layout::{self, StoreLayout};
use crate::logging::{self, Component};
use crate::model::FetchResult;

/// Files written by one save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFiles {
    pub huc: String,
    pub data_file: PathBuf,
    pub index_file: PathBuf,
}

impl SavedFiles {
    pub fn paths(&self) -> Vec<PathBuf> {
        vec![self.data_file.clone(), self.index_file.clone()]
    }
}

/// Merges `fetch` into the store.
///
/// Each fetched product replaces its previous entry for the watershed;
/// products not in the fetch are kept as they were. Saving the same fetch
/// twice leaves the store byte-for-byte unchanged.
pub fn save(fetch: &FetchResult, layout: &StoreLayout) -> StoreResult<SavedFiles> {
    let huc = validate_fetch(fetch)?;

    let mut file = HucDataFile::load(layout, &huc)?.unwrap_or_else(|| HucDataFile::new(&huc));
    let mut site_rows = 0;
    for (parm_cd, product) in &fetch.products {
        let entry = ProductEntry::from_fetch(product);
        site_rows += entry.meta.sites.len();
        file.replace_product(parm_cd, entry);
    }

    // An index left behind by an earlier failed save, or one that no longer
    // decodes, is rebuilt rather than patched
    let mut index = if layout.index_is_stale() {
        logging::warn(
            Component::Save,
            Some(huc.as_str()),
            "Index flagged stale by an earlier save; rebuilding",
        );
        None
    } else {
        match MetadataIndex::load(layout) {
            Ok(index) => index,
            Err(StoreError::Corrupt { path, source }) => {
                logging::warn(
                    Component::Save,
                    Some(huc.as_str()),
                    &format!("Index {} unreadable ({}); rebuilding", path.display(), source),
                );
                None
            }
            Err(e) => return Err(e),
        }
    };

    mark_index_stale(layout)?;
    let data_file = file.write(layout)?;

    let index_file = match index.as_mut() {
        Some(index) => {
            index.replace_huc(&huc, file.index_rows());
            index.write(layout)
        }
        None => MetadataIndex::rebuild(layout).and_then(|index| index.write(layout)),
    };
    let index_file = match index_file {
        Ok(path) => path,
        Err(e) => {
            logging::error(
                Component::Save,
                Some(huc.as_str()),
                &format!("Data file written but index update failed; index left flagged stale: {}", e),
            );
            return Err(e);
        }
    };
    clear_index_stale(layout)?;

    logging::log_save_summary(&huc, fetch.products.len(), site_rows, fetch.record_count());

    Ok(SavedFiles {
        huc,
        data_file,
        index_file,
    })
}

/// Regenerates the index from the data files and writes it, clearing any
/// stale flag. Returns the number of rows written.
pub fn rebuild_index(layout: &StoreLayout) -> StoreResult<usize> {
    let index = MetadataIndex::rebuild(layout)?;
    index.write(layout)?;
    clear_index_stale(layout)?;
    logging::info(
        Component::Index,
        None,
        &format!("Rebuilt index: {} row(s) from {} watershed(s)", index.len(), index.hucs().len()),
    );
    Ok(index.len())
}

/// Checks that a fetch carries everything the index depends on and returns
/// its single HUC8.
fn validate_fetch(fetch: &FetchResult) -> StoreResult<String> {
    if fetch.is_empty() {
        return Err(StoreError::MalformedFetchResult(
            "fetch result contains no products".to_string(),
        ));
    }

    let mut huc: Option<&str> = None;
    for (parm_cd, product) in &fetch.products {
        layout::validate_product(parm_cd)
            .map_err(|_| malformed(parm_cd, format!("invalid product code '{}'", parm_cd)))?;

        if product.meta.variable.parm_cd != *parm_cd {
            return Err(malformed(
                parm_cd,
                format!(
                    "variable metadata describes '{}'",
                    product.meta.variable.parm_cd
                ),
            ));
        }

        if product.meta.sites.is_empty() {
            return Err(malformed(parm_cd, "no site metadata".to_string()));
        }

        let mut described = HashSet::new();
        for site in &product.meta.sites {
            if site.site_no.trim().is_empty() {
                return Err(malformed(parm_cd, "site metadata without a site number".to_string()));
            }
            layout::validate_huc8(&site.huc_cd).map_err(|_| {
                malformed(
                    parm_cd,
                    format!("site {} has invalid HUC8 '{}'", site.site_no, site.huc_cd),
                )
            })?;

            match huc {
                None => huc = Some(site.huc_cd.as_str()),
                Some(expected) if expected != site.huc_cd => {
                    return Err(malformed(
                        parm_cd,
                        format!(
                            "site {} is in HUC {}, fetch is for HUC {}",
                            site.site_no, site.huc_cd, expected
                        ),
                    ));
                }
                Some(_) => {}
            }
            described.insert(site.site_no.as_str());
        }

        if let Some(bad) = product.records.iter().find(|r| !r.record.value.is_finite()) {
            return Err(malformed(
                parm_cd,
                format!(
                    "site {} has non-finite value {} at {}",
                    bad.site_no,
                    bad.record.value,
                    bad.record.datetime.to_rfc3339()
                ),
            ));
        }

        if let Some(orphan) = product
            .records
            .iter()
            .find(|r| !described.contains(r.site_no.as_str()))
        {
            return Err(malformed(
                parm_cd,
                format!("records for site {} which has no site metadata", orphan.site_no),
            ));
        }
    }

    huc.map(str::to_string).ok_or_else(|| {
        StoreError::MalformedFetchResult("fetch result names no HUC8".to_string())
    })
}

fn malformed(parm_cd: &str, message: String) -> StoreError {
    StoreError::MalformedFetchResult(format!("product {}: {}", parm_cd, message))
}

fn mark_index_stale(layout: &StoreLayout) -> StoreResult<()> {
    let path = layout.stale_marker_path();
    fs::write(&path, b"").map_err(|e| StoreError::persistence(&path, e))
}

fn clear_index_stale(layout: &StoreLayout) -> StoreResult<()> {
    let path = layout.stale_marker_path();
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::persistence(&path, e)),
    }
}
