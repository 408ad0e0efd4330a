/// Core data types for the HUC8 station-data store.
///
/// This module defines the shared domain model imported by all other modules:
/// site/variable/statistic descriptors, observation records, the nested
/// fetch result handed to the save path, and the flattened index row.
/// It contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Parameter codes
// ---------------------------------------------------------------------------

/// USGS parameter code for discharge (streamflow), in cubic feet per second.
pub const PARAM_DISCHARGE: &str = "00060";

/// USGS parameter code for gage height (stage), in feet.
pub const PARAM_STAGE: &str = "00065";

/// USGS statistic code for a daily mean.
pub const STAT_MEAN: &str = "00003";

// ---------------------------------------------------------------------------
// Metadata descriptors
// ---------------------------------------------------------------------------

/// Descriptor of one observation site.
///
/// Field names follow the USGS site-service column names so the index can be
/// queried with the same vocabulary (`site_no`, `station_nm`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub site_no: String,
    pub station_nm: String,
    pub dec_lat_va: Option<f64>,
    pub dec_long_va: Option<f64>,
    /// 8-digit watershed code the site is filed under.
    pub huc_cd: String,
    #[serde(default)]
    pub agency_cd: String,
    #[serde(default)]
    pub site_tp_cd: String,
    #[serde(default)]
    pub state_cd: String,
    #[serde(default)]
    pub county_cd: String,
}

impl SiteInfo {
    /// Minimal descriptor; auxiliary fields are left empty.
    pub fn new(site_no: &str, station_nm: &str, huc_cd: &str) -> Self {
        SiteInfo {
            site_no: site_no.to_string(),
            station_nm: station_nm.to_string(),
            dec_lat_va: None,
            dec_long_va: None,
            huc_cd: huc_cd.to_string(),
            agency_cd: "USGS".to_string(),
            site_tp_cd: String::new(),
            state_cd: String::new(),
            county_cd: String::new(),
        }
    }
}

/// The measured quantity of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub parm_cd: String,
    pub variable_nm: String,
    #[serde(default)]
    pub variable_desc: String,
    pub unit_cd: String,
    pub no_data_va: Option<f64>,
}

/// The aggregation applied to a product. Instantaneous values have none, in
/// which case both fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticInfo {
    #[serde(default)]
    pub stat_cd: String,
    #[serde(default)]
    pub stat_nm: String,
}

/// The (SiteInfo, VariableInfo, StatisticInfo) bundle describing one
/// (HUC8, product) slice of data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataTriple {
    pub sites: Vec<SiteInfo>,
    pub variable: VariableInfo,
    #[serde(default)]
    pub statistic: StatisticInfo,
}

// ---------------------------------------------------------------------------
// Observation types
// ---------------------------------------------------------------------------

/// One timestamped value of a site+product series as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub datetime: DateTime<Utc>,
    pub value: f64,
    #[serde(default)]
    pub qualifier: String, // "P" = provisional, "A" = approved, may be combined ("P,e")
}

/// One observation as produced by a fetch: a record plus the site it
/// belongs to. The product is implied by the enclosing `ProductFetch`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedObservation {
    pub site_no: String,
    pub record: ObservationRecord,
}

/// One observation as returned by a query, attributed to the file it was
/// read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteObservation {
    pub huc_cd: String,
    pub site_no: String,
    pub parm_cd: String,
    pub datetime: DateTime<Utc>,
    pub value: f64,
    pub qualifier: String,
}

// ---------------------------------------------------------------------------
// Fetch result
// ---------------------------------------------------------------------------

/// Everything one fetch returned for a single product in one HUC8.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFetch {
    pub records: Vec<FetchedObservation>,
    pub meta: MetadataTriple,
}

/// The nested result of fetching one watershed, keyed by product code.
///
/// All products share a single HUC8 by construction of the fetch; the save
/// path verifies this rather than trusting it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResult {
    pub products: BTreeMap<String, ProductFetch>,
}

impl FetchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) one product's data.
    pub fn insert(&mut self, parm_cd: &str, product: ProductFetch) {
        self.products.insert(parm_cd.to_string(), product);
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Total number of observation records across all products.
    pub fn record_count(&self) -> usize {
        self.products.values().map(|p| p.records.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Index row
// ---------------------------------------------------------------------------

/// One row of the metadata index: one site, for one product, in one HUC8.
///
/// Serialized flat, so every descriptor field is a top-level column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    /// Data-file HUC8 this row is backed by.
    pub huc: String,
    pub parm_cd: String,
    #[serde(flatten)]
    pub site: SiteInfo,
    #[serde(flatten)]
    pub variable: VariableInfoColumns,
    #[serde(flatten)]
    pub statistic: StatisticInfo,
}

/// `VariableInfo` without its product code, which the row already carries
/// as `parm_cd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfoColumns {
    pub variable_nm: String,
    #[serde(default)]
    pub variable_desc: String,
    pub unit_cd: String,
    pub no_data_va: Option<f64>,
}

impl From<&VariableInfo> for VariableInfoColumns {
    fn from(v: &VariableInfo) -> Self {
        VariableInfoColumns {
            variable_nm: v.variable_nm.clone(),
            variable_desc: v.variable_desc.clone(),
            unit_cd: v.unit_cd.clone(),
            no_data_va: v.no_data_va,
        }
    }
}

/// Every column an index row exposes, in table order.
pub const INDEX_COLUMNS: &[&str] = &[
    "huc",
    "parm_cd",
    "site_no",
    "station_nm",
    "dec_lat_va",
    "dec_long_va",
    "huc_cd",
    "agency_cd",
    "site_tp_cd",
    "state_cd",
    "county_cd",
    "variable_nm",
    "variable_desc",
    "unit_cd",
    "no_data_va",
    "stat_cd",
    "stat_nm",
];
