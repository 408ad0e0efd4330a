/// Per-watershed data file.
///
/// One file per HUC8 holds, for every product fetched so far, the metadata
/// triple and the full observation series of each site:
///
/// ```text
/// { "huc_cd": "10190005", "format_version": 1,
///   "products": { "00060": { "meta": {...}, "data": { "06727500": [...] } } } }
/// ```
///
/// Maps are ordered, so the same content always serializes to the same bytes.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::layout::StoreLayout;
use crate::logging::{self, Component};
use crate::model::{
    IndexRow, MetadataTriple, ObservationRecord, ProductFetch, SiteObservation,
    VariableInfoColumns,
};
use crate::persist;

pub const HUC_FILE_FORMAT_VERSION: u32 = 1;

/// Metadata and series for one product within a watershed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductEntry {
    pub meta: MetadataTriple,
    /// Series keyed by site number, each sorted by timestamp with no
    /// repeated timestamps.
    pub data: BTreeMap<String, Vec<ObservationRecord>>,
}

impl ProductEntry {
    /// Builds an entry from freshly fetched data.
    ///
    /// Duplicate site descriptors collapse to the first one seen. Every site
    /// gets a series, empty if the fetch returned no records for it.
    pub fn from_fetch(product: &ProductFetch) -> Self {
        let mut seen = HashSet::new();
        let sites: Vec<_> = product
            .meta
            .sites
            .iter()
            .filter(|s| seen.insert(s.site_no.clone()))
            .cloned()
            .collect();

        let mut grouped: BTreeMap<String, Vec<ObservationRecord>> = sites
            .iter()
            .map(|s| (s.site_no.clone(), Vec::new()))
            .collect();
        for obs in &product.records {
            grouped
                .entry(obs.site_no.clone())
                .or_default()
                .push(obs.record.clone());
        }

        let data = grouped
            .into_iter()
            .map(|(site, records)| (site, normalize_series(records)))
            .collect();

        ProductEntry {
            meta: MetadataTriple {
                sites,
                variable: product.meta.variable.clone(),
                statistic: product.meta.statistic.clone(),
            },
            data,
        }
    }

    pub fn record_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}

/// Sorts a series by timestamp and collapses repeated timestamps, keeping
/// the record that came last in the input.
pub fn normalize_series(mut records: Vec<ObservationRecord>) -> Vec<ObservationRecord> {
    // stable: equal timestamps keep input order, so the last one wins below
    records.sort_by_key(|r| r.datetime);

    let mut out: Vec<ObservationRecord> = Vec::with_capacity(records.len());
    for record in records {
        match out.last_mut() {
            Some(prev) if prev.datetime == record.datetime => *prev = record,
            _ => out.push(record),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HucDataFile {
    pub huc_cd: String,
    pub format_version: u32,
    pub products: BTreeMap<String, ProductEntry>,
}

impl HucDataFile {
    pub fn new(huc: &str) -> Self {
        HucDataFile {
            huc_cd: huc.to_string(),
            format_version: HUC_FILE_FORMAT_VERSION,
            products: BTreeMap::new(),
        }
    }

    /// Loads the data file for `huc`, or `None` if the watershed has never
    /// been saved.
    pub fn load(layout: &StoreLayout, huc: &str) -> StoreResult<Option<Self>> {
        let path = layout.data_file_path(huc)?;
        let file: Option<HucDataFile> = persist::read_json(&path)?;
        match file {
            Some(file) if file.huc_cd != huc => Err(StoreError::InvalidLayout(format!(
                "data file {} holds HUC {}",
                path.display(),
                file.huc_cd
            ))),
            other => Ok(other),
        }
    }

    /// Loads a data file the index says must exist.
    pub fn load_required(layout: &StoreLayout, huc: &str) -> StoreResult<Self> {
        match Self::load(layout, huc)? {
            Some(file) => Ok(file),
            None => Err(StoreError::MissingDataFile {
                huc: huc.to_string(),
                path: layout.data_file_path(huc)?,
            }),
        }
    }

    /// Writes the file to its place in the layout, returning the path.
    pub fn write(&self, layout: &StoreLayout) -> StoreResult<PathBuf> {
        let path = layout.data_file_path(&self.huc_cd)?;
        persist::write_json_atomic(&path, self)?;
        logging::debug(
            Component::DataFile,
            Some(self.huc_cd.as_str()),
            &format!("Wrote {} product(s) to {}", self.products.len(), path.display()),
        );
        Ok(path)
    }

    /// Replaces one product wholesale. Other products are untouched.
    pub fn replace_product(&mut self, parm_cd: &str, entry: ProductEntry) {
        self.products.insert(parm_cd.to_string(), entry);
    }

    /// Index rows describing this file: one per site per product, products
    /// in code order, sites in saved order.
    pub fn index_rows(&self) -> Vec<IndexRow> {
        let mut rows = Vec::new();
        for (parm_cd, entry) in &self.products {
            let variable = VariableInfoColumns::from(&entry.meta.variable);
            for site in &entry.meta.sites {
                rows.push(IndexRow {
                    huc: self.huc_cd.clone(),
                    parm_cd: parm_cd.clone(),
                    site: site.clone(),
                    variable: variable.clone(),
                    statistic: entry.meta.statistic.clone(),
                });
            }
        }
        rows
    }

    /// The stored series for one site and product.
    pub fn series(&self, site_no: &str, parm_cd: &str) -> Option<&[ObservationRecord]> {
        self.products
            .get(parm_cd)
            .and_then(|entry| entry.data.get(site_no))
            .map(Vec::as_slice)
    }

    /// The series for one site and product, attributed to this watershed.
    /// Empty if the site has no data for the product.
    pub fn site_observations(&self, site_no: &str, parm_cd: &str) -> Vec<SiteObservation> {
        self.series(site_no, parm_cd)
            .unwrap_or_default()
            .iter()
            .map(|r| SiteObservation {
                huc_cd: self.huc_cd.clone(),
                site_no: site_no.to_string(),
                parm_cd: parm_cd.to_string(),
                datetime: r.datetime,
                value: r.value,
                qualifier: r.qualifier.clone(),
            })
            .collect()
    }
}
