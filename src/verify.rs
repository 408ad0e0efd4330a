//! Store Verification Module
//!
//! Checks the stored metadata index against the per-HUC data files and
//! reports every disagreement in both directions: index rows with no backing
//! data-file entry, and data-file entries with no index row.
//!
//! Run this after an interrupted save, or before trusting a store copied
//! from elsewhere.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::StoreResult;
use crate::hucfile::HucDataFile;
use crate::index::MetadataIndex;
use crate::layout::StoreLayout;
use crate::logging::{self, Component};

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub status: VerificationStatus,
    pub index_present: bool,
    pub index_flagged_stale: bool,
    pub hucs_checked: usize,
    pub rows_checked: usize,
    /// Index rows whose (HUC8, product, site) is absent from the data files.
    pub orphan_rows: Vec<EntryKey>,
    /// Data-file entries with no index row.
    pub unindexed_entries: Vec<EntryKey>,
    /// HUC8 codes the index references that have no data file.
    pub missing_files: Vec<String>,
}

/// A (HUC8, product, site) triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub huc: String,
    pub parm_cd: String,
    pub site_no: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Consistent,
    Inconsistent,
}

impl VerificationReport {
    pub fn is_consistent(&self) -> bool {
        self.status == VerificationStatus::Consistent
    }
}

// ============================================================================
// Verification
// ============================================================================

pub fn verify_store(layout: &StoreLayout) -> StoreResult<VerificationReport> {
    let stored = MetadataIndex::load(layout)?;
    let index_present = stored.is_some();
    let index = stored.unwrap_or_default();

    let data_hucs = layout.list_hucs()?;
    let mut on_disk = BTreeSet::new();
    for huc in &data_hucs {
        let file = HucDataFile::load_required(layout, huc)?;
        for row in file.index_rows() {
            on_disk.insert(EntryKey {
                huc: row.huc,
                parm_cd: row.parm_cd,
                site_no: row.site.site_no,
            });
        }
    }

    let indexed: BTreeSet<EntryKey> = index
        .rows
        .iter()
        .map(|row| EntryKey {
            huc: row.huc.clone(),
            parm_cd: row.parm_cd.clone(),
            site_no: row.site.site_no.clone(),
        })
        .collect();

    let orphan_rows: Vec<EntryKey> = indexed.difference(&on_disk).cloned().collect();
    let unindexed_entries: Vec<EntryKey> = on_disk.difference(&indexed).cloned().collect();
    let missing_files: Vec<String> = index
        .hucs()
        .into_iter()
        .filter(|huc| !data_hucs.contains(huc))
        .collect();

    let index_flagged_stale = layout.index_is_stale();
    let status = if orphan_rows.is_empty()
        && unindexed_entries.is_empty()
        && missing_files.is_empty()
        && !index_flagged_stale
    {
        VerificationStatus::Consistent
    } else {
        VerificationStatus::Inconsistent
    };

    let report = VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        status,
        index_present,
        index_flagged_stale,
        hucs_checked: data_hucs.len(),
        rows_checked: index.len(),
        orphan_rows,
        unindexed_entries,
        missing_files,
    };

    if report.is_consistent() {
        logging::info(
            Component::Index,
            None,
            &format!("Store consistent: {} row(s), {} watershed(s)", report.rows_checked, report.hucs_checked),
        );
    } else {
        logging::warn(
            Component::Index,
            None,
            &format!(
                "Store inconsistent: {} orphan row(s), {} unindexed entr(ies), {} missing file(s)",
                report.orphan_rows.len(),
                report.unindexed_entries.len(),
                report.missing_files.len()
            ),
        );
    }

    Ok(report)
}
