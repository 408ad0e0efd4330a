/// Aggregated metadata index.
///
/// The index is a cache over the per-HUC data files: one row per site per
/// product per HUC8, regenerable at any time with [`MetadataIndex::rebuild`].
/// Saves update it by replacing every row of the saved watershed, which
/// yields exactly the rows a full rebuild would.
///
/// Row order is HUC8 ascending, then product code ascending, then sites in
/// the order they were saved. Lookups that can match several rows take the
/// first one in this order.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::hucfile::HucDataFile;
use crate::layout::StoreLayout;
use crate::logging::{self, Component};
use crate::model::IndexRow;
use crate::persist;

pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataIndex {
    pub format_version: u32,
    pub rows: Vec<IndexRow>,
}

impl Default for MetadataIndex {
    fn default() -> Self {
        MetadataIndex {
            format_version: INDEX_FORMAT_VERSION,
            rows: Vec::new(),
        }
    }
}

impl MetadataIndex {
    /// Reads the index file as stored, or `None` if there is none.
    pub fn load(layout: &StoreLayout) -> StoreResult<Option<Self>> {
        persist::read_json(&layout.index_path())
    }

    /// Builds the index from the data files alone.
    pub fn rebuild(layout: &StoreLayout) -> StoreResult<Self> {
        let mut index = MetadataIndex::default();
        for huc in layout.list_hucs()? {
            let file = HucDataFile::load_required(layout, &huc)?;
            index.rows.extend(file.index_rows());
        }
        Ok(index)
    }

    /// The index a reader should use.
    ///
    /// If the stored index is flagged stale, absent, or undecodable, the rows
    /// are rebuilt in memory. Nothing is written.
    pub fn load_current(layout: &StoreLayout) -> StoreResult<Self> {
        if layout.index_is_stale() {
            logging::warn(
                Component::Index,
                None,
                "Index flagged stale; rebuilding from data files for this read",
            );
            return Self::rebuild(layout);
        }

        match Self::load(layout) {
            Ok(Some(index)) => Ok(index),
            Ok(None) => Self::rebuild(layout),
            Err(StoreError::Corrupt { path, source }) => {
                logging::warn(
                    Component::Index,
                    None,
                    &format!("Index {} unreadable ({}); rebuilding for this read", path.display(), source),
                );
                Self::rebuild(layout)
            }
            Err(e) => Err(e),
        }
    }

    /// Writes the index file, returning its path.
    pub fn write(&self, layout: &StoreLayout) -> StoreResult<PathBuf> {
        let path = layout.index_path();
        persist::write_json_atomic(&path, self)?;
        logging::debug(
            Component::Index,
            None,
            &format!("Wrote {} row(s) to {}", self.rows.len(), path.display()),
        );
        Ok(path)
    }

    /// Drops every row for `huc` and inserts `rows` in its place.
    pub fn replace_huc(&mut self, huc: &str, rows: Vec<IndexRow>) {
        self.rows.retain(|r| r.huc != huc);
        self.rows.extend(rows);
        // stable: site order within a (huc, product) slice is preserved
        self.rows
            .sort_by(|a, b| (&a.huc, &a.parm_cd).cmp(&(&b.huc, &b.parm_cd)));
    }

    pub fn rows_for_huc<'a>(&'a self, huc: &'a str) -> impl Iterator<Item = &'a IndexRow> + 'a {
        self.rows.iter().filter(move |r| r.huc == huc)
    }

    /// Distinct HUC8 codes referenced by the index, sorted.
    pub fn hucs(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.huc.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// First row for a site identifier.
    pub fn find_site(&self, site_no: &str) -> Option<&IndexRow> {
        self.rows.iter().find(|r| r.site.site_no == site_no)
    }

    /// First row whose site name matches exactly.
    pub fn find_site_by_name(&self, station_nm: &str) -> Option<&IndexRow> {
        self.rows.iter().find(|r| r.site.station_nm == station_nm)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
