/// Read-only access to the store.
///
/// Every query resolves identifiers through the metadata index first and
/// only then opens data files, so a query that fails on an unknown site
/// touches no data file. Queries never write; if the index is flagged stale
/// they work from an in-memory rebuild.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::hucfile::HucDataFile;
use crate::index::MetadataIndex;
use crate::layout::{self, StoreLayout};
use crate::logging::{self, Component};
use crate::model::{INDEX_COLUMNS, IndexRow, SiteObservation};

/// A projection of the metadata index: one row per (HUC8, product, site).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteInfoTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl SiteInfoTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let pos = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[pos]).collect())
    }
}

/// Projects `fields` from every index row. An empty `fields` selects every
/// column.
///
/// A site that has data for several products appears once per product.
pub fn query_site_info(fields: &[&str], layout: &StoreLayout) -> StoreResult<SiteInfoTable> {
    let columns: Vec<String> = if fields.is_empty() {
        INDEX_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        fields.iter().map(|f| f.to_string()).collect()
    };
    if let Some(unknown) = columns.iter().find(|c| !INDEX_COLUMNS.contains(&c.as_str())) {
        return Err(StoreError::UnknownField(unknown.clone()));
    }

    let index = MetadataIndex::load_current(layout)?;
    let mut rows = Vec::with_capacity(index.len());
    for row in &index.rows {
        let object = row_object(row)?;
        rows.push(
            columns
                .iter()
                .map(|c| object.get(c).cloned().unwrap_or(Value::Null))
                .collect(),
        );
    }

    Ok(SiteInfoTable { columns, rows })
}

fn row_object(row: &IndexRow) -> StoreResult<serde_json::Map<String, Value>> {
    let value = serde_json::to_value(row)
        .map_err(|e| StoreError::corrupt(String::from("<index row>"), e))?;
    into_object(value, &row.site.site_no)
}

fn into_object(value: Value, site_no: &str) -> StoreResult<serde_json::Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidLayout(format!(
            "index row for site {} is not an object: {}",
            site_no, other
        ))),
    }
}

/// Translates a site number to its name, or a site name to its number.
///
/// Input is first tried as a site number, then as an exact site name. When
/// several rows match, the first row in index order wins (HUC8, then
/// product, then saved site order); disagreement between rows is not an
/// error.
pub fn query_site_name(identifier_or_name: &str, layout: &StoreLayout) -> StoreResult<String> {
    let index = MetadataIndex::load_current(layout)?;
    translate_site(&index, identifier_or_name)
}

fn translate_site(index: &MetadataIndex, identifier_or_name: &str) -> StoreResult<String> {
    if let Some(row) = index.find_site(identifier_or_name) {
        return Ok(row.site.station_nm.clone());
    }
    if let Some(row) = index.find_site_by_name(identifier_or_name) {
        return Ok(row.site.site_no.clone());
    }
    Err(StoreError::UnknownSite(identifier_or_name.to_string()))
}

/// The HUC8 a site is filed under.
pub fn query_site_huc(site_no: &str, layout: &StoreLayout) -> StoreResult<String> {
    let index = MetadataIndex::load_current(layout)?;
    index
        .find_site(site_no)
        .map(|row| row.huc.clone())
        .ok_or_else(|| StoreError::UnknownSite(site_no.to_string()))
}

/// Observations of `parm_cd` for each requested site, concatenated in the
/// order the sites were requested.
///
/// Every site is resolved before any data file is opened; each watershed's
/// file is read once no matter how many requested sites it holds. A known
/// site without data for the product contributes nothing.
pub fn query_site_data(
    site_nos: &[&str],
    parm_cd: &str,
    layout: &StoreLayout,
) -> StoreResult<Vec<SiteObservation>> {
    layout::validate_product(parm_cd)?;
    let index = MetadataIndex::load_current(layout)?;

    let mut resolved = Vec::with_capacity(site_nos.len());
    for site_no in site_nos {
        let row = index
            .find_site(site_no)
            .ok_or_else(|| StoreError::UnknownSite(site_no.to_string()))?;
        resolved.push((*site_no, row.huc.as_str()));
    }

    let mut files: HashMap<&str, HucDataFile> = HashMap::new();
    let mut out = Vec::new();
    for (site_no, huc) in resolved {
        if !files.contains_key(huc) {
            let file = HucDataFile::load_required(layout, huc).inspect_err(|e| {
                logging::error(Component::Query, Some(huc), &format!("Index/data mismatch: {}", e));
            })?;
            files.insert(huc, file);
        }
        if let Some(file) = files.get(huc) {
            out.extend(file.site_observations(site_no, parm_cd));
        }
    }

    logging::debug(
        Component::Query,
        None,
        &format!(
            "{} record(s) for {} site(s) across {} watershed(s)",
            out.len(),
            site_nos.len(),
            files.len()
        ),
    );
    Ok(out)
}

/// Every series of `parm_cd` in one watershed, sites in saved order.
pub fn query_huc_data(
    huc: &str,
    parm_cd: &str,
    layout: &StoreLayout,
) -> StoreResult<Vec<SiteObservation>> {
    layout::validate_product(parm_cd)?;
    let file = match HucDataFile::load(layout, huc)? {
        Some(file) => file,
        None => return Ok(Vec::new()),
    };

    let mut out = Vec::new();
    if let Some(entry) = file.products.get(parm_cd) {
        for site in &entry.meta.sites {
            out.extend(file.site_observations(&site.site_no, parm_cd));
        }
    }
    Ok(out)
}
