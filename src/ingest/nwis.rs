/// USGS NWIS Water Services Client
///
/// Retrieves every gauge in a HUC8 watershed from the NWIS instantaneous
/// values (IV) or daily values (DV) service and turns the WaterML-JSON
/// response into a [`FetchResult`] ready for the store.
///
/// API Documentation: https://waterservices.usgs.gov/docs/

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::NwisConfig;
use crate::error::FetchError;
use crate::ingest::Fetch;
use crate::logging::{self, Component};
use crate::model::{
    FetchResult, FetchedObservation, MetadataTriple, ObservationRecord, ProductFetch, SiteInfo,
    StatisticInfo, VariableInfo, STAT_MEAN,
};

/// Sentinel NWIS uses for missing values when a series omits `noDataValue`.
pub const NWIS_NO_DATA: f64 = -999999.0;

// ============================================================================
// WaterML-JSON Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct NwisResponse {
    pub value: NwisValue,
}

#[derive(Debug, Deserialize)]
pub struct NwisValue {
    #[serde(rename = "timeSeries", default)]
    pub time_series: Vec<NwisTimeSeries>,
}

#[derive(Debug, Deserialize)]
pub struct NwisTimeSeries {
    #[serde(rename = "sourceInfo")]
    pub source_info: NwisSourceInfo,
    pub variable: NwisVariable,
    #[serde(default)]
    pub values: Vec<NwisValueBlock>,
}

#[derive(Debug, Deserialize)]
pub struct NwisSourceInfo {
    #[serde(rename = "siteName")]
    pub site_name: String,
    #[serde(rename = "siteCode")]
    pub site_code: Vec<NwisSiteCode>,
    #[serde(rename = "geoLocation")]
    pub geo_location: Option<NwisGeoLocation>,
    #[serde(rename = "siteProperty", default)]
    pub site_property: Vec<NwisNamedValue>,
}

#[derive(Debug, Deserialize)]
pub struct NwisSiteCode {
    pub value: String,
    #[serde(rename = "agencyCode", default)]
    pub agency_code: String,
}

#[derive(Debug, Deserialize)]
pub struct NwisGeoLocation {
    #[serde(rename = "geogLocation")]
    pub geog_location: NwisGeogLocation,
}

#[derive(Debug, Deserialize)]
pub struct NwisGeogLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct NwisNamedValue {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct NwisVariable {
    #[serde(rename = "variableCode")]
    pub variable_code: Vec<NwisVariableCode>,
    #[serde(rename = "variableName", default)]
    pub variable_name: String,
    #[serde(rename = "variableDescription", default)]
    pub variable_description: String,
    pub unit: NwisUnit,
    #[serde(rename = "noDataValue")]
    pub no_data_value: Option<f64>,
    pub options: Option<NwisOptions>,
}

#[derive(Debug, Deserialize)]
pub struct NwisVariableCode {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct NwisUnit {
    #[serde(rename = "unitCode")]
    pub unit_code: String,
}

#[derive(Debug, Deserialize)]
pub struct NwisOptions {
    #[serde(default)]
    pub option: Vec<NwisOption>,
}

#[derive(Debug, Deserialize)]
pub struct NwisOption {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(rename = "optionCode")]
    pub option_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NwisValueBlock {
    #[serde(default)]
    pub value: Vec<NwisPoint>,
}

#[derive(Debug, Deserialize)]
pub struct NwisPoint {
    pub value: String,
    #[serde(default)]
    pub qualifiers: Vec<String>,
    #[serde(rename = "dateTime")]
    pub date_time: String,
}

// ============================================================================
// URL Construction
// ============================================================================

/// Which NWIS values service to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// 15-minute instantaneous values.
    Instantaneous,
    /// Daily means.
    Daily,
}

impl Service {
    fn path(self) -> &'static str {
        match self {
            Service::Instantaneous => "iv",
            Service::Daily => "dv",
        }
    }
}

/// Builds a values-service URL for every site in one HUC8.
///
/// `period` is an ISO 8601 duration such as "P7D". Daily requests ask for
/// the mean only; without `statCd` the dv service returns every statistic.
pub fn build_huc_url(base_url: &str, service: Service, huc: &str, parm_cds: &[&str], period: &str) -> String {
    let mut url = format!(
        "{}/{}/?format=json&huc={}&parameterCd={}&period={}&siteStatus=all",
        base_url.trim_end_matches('/'),
        service.path(),
        huc,
        parm_cds.join(","),
        period
    );
    if service == Service::Daily {
        url.push_str("&statCd=");
        url.push_str(STAT_MEAN);
    }
    url
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Parses a WaterML-JSON body into a fetch result for `huc`.
///
/// Points equal to the series' no-data sentinel, non-finite, or unparseable
/// are dropped. A product reported under more than one statistic keeps a
/// single one so a stored series never mixes them: the mean if any series
/// carries it, otherwise the first statistic seen.
pub fn parse_huc_response(body: &str, huc: &str) -> Result<FetchResult, FetchError> {
    let response: NwisResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    if response.value.time_series.is_empty() {
        return Err(FetchError::NoDataAvailable(huc.to_string()));
    }

    let mut chosen: BTreeMap<String, StatisticInfo> = BTreeMap::new();
    for series in &response.value.time_series {
        let parm_cd = product_code(&series.variable)?;
        let statistic = statistic_info(&series.variable);
        let replace = match chosen.get(&parm_cd) {
            None => true,
            Some(current) => current.stat_cd != STAT_MEAN && statistic.stat_cd == STAT_MEAN,
        };
        if replace {
            chosen.insert(parm_cd, statistic);
        }
    }

    let mut products: BTreeMap<String, ProductFetch> = BTreeMap::new();
    for series in response.value.time_series {
        let parm_cd = product_code(&series.variable)?;
        let site = site_info(&series.source_info, huc)?;
        let statistic = statistic_info(&series.variable);

        if chosen.get(&parm_cd) != Some(&statistic) {
            logging::warn(
                Component::Fetch,
                Some(site.site_no.as_str()),
                &format!(
                    "Skipping {} series with statistic {} (keeping {})",
                    parm_cd,
                    statistic.stat_cd,
                    chosen.get(&parm_cd).map(|s| s.stat_cd.as_str()).unwrap_or("none")
                ),
            );
            continue;
        }
        let no_data = series.variable.no_data_value.unwrap_or(NWIS_NO_DATA);

        let product = products.entry(parm_cd.clone()).or_insert_with(|| ProductFetch {
            records: Vec::new(),
            meta: MetadataTriple {
                sites: Vec::new(),
                variable: VariableInfo {
                    parm_cd: parm_cd.clone(),
                    variable_nm: series.variable.variable_name.clone(),
                    variable_desc: series.variable.variable_description.clone(),
                    unit_cd: series.variable.unit.unit_code.clone(),
                    no_data_va: series.variable.no_data_value,
                },
                statistic: statistic.clone(),
            },
        });

        if !product.meta.sites.iter().any(|s| s.site_no == site.site_no) {
            product.meta.sites.push(site.clone());
        }

        for point in series.values.iter().flat_map(|block| block.value.iter()) {
            let value = match point.value.trim().parse::<f64>() {
                Ok(v) if v.is_finite() && v != no_data => v,
                _ => continue,
            };
            let datetime = match DateTime::parse_from_rfc3339(&point.date_time) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(_) => continue,
            };
            product.records.push(FetchedObservation {
                site_no: site.site_no.clone(),
                record: ObservationRecord {
                    datetime,
                    value,
                    qualifier: point.qualifiers.join(","),
                },
            });
        }
    }

    Ok(FetchResult { products })
}

fn product_code(variable: &NwisVariable) -> Result<String, FetchError> {
    variable
        .variable_code
        .first()
        .map(|c| c.value.clone())
        .ok_or_else(|| FetchError::Parse("timeSeries without variableCode".to_string()))
}

fn site_info(source: &NwisSourceInfo, huc: &str) -> Result<SiteInfo, FetchError> {
    let code = source
        .site_code
        .first()
        .ok_or_else(|| FetchError::Parse("sourceInfo without siteCode".to_string()))?;

    let property = |name: &str| {
        source
            .site_property
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.clone())
            .unwrap_or_default()
    };

    let reported_huc = property("hucCd");
    if !reported_huc.is_empty() && reported_huc != huc {
        logging::debug(
            Component::Fetch,
            Some(code.value.as_str()),
            &format!("Site reports HUC {}, filing under requested HUC {}", reported_huc, huc),
        );
    }

    Ok(SiteInfo {
        site_no: code.value.clone(),
        station_nm: source.site_name.clone(),
        dec_lat_va: source.geo_location.as_ref().map(|g| g.geog_location.latitude),
        dec_long_va: source.geo_location.as_ref().map(|g| g.geog_location.longitude),
        huc_cd: huc.to_string(),
        agency_cd: code.agency_code.clone(),
        site_tp_cd: property("siteTypeCd"),
        state_cd: property("stateCd"),
        county_cd: property("countyCd"),
    })
}

fn statistic_info(variable: &NwisVariable) -> StatisticInfo {
    variable
        .options
        .as_ref()
        .and_then(|opts| opts.option.iter().find(|o| o.name == "Statistic"))
        .map(|o| StatisticInfo {
            stat_cd: o.option_code.clone().unwrap_or_default(),
            stat_nm: o.value.clone().unwrap_or_default(),
        })
        .unwrap_or_default()
}

// ============================================================================
// API Client
// ============================================================================

pub struct NwisClient {
    client: reqwest::blocking::Client,
    config: NwisConfig,
    service: Service,
}

impl NwisClient {
    pub fn new(config: NwisConfig, service: Service) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(NwisClient {
            client,
            config,
            service,
        })
    }
}

impl Fetch for NwisClient {
    fn fetch_huc(&self, huc: &str, parm_cds: &[&str]) -> Result<FetchResult, FetchError> {
        let url = build_huc_url(&self.config.base_url, self.service, huc, parm_cds, &self.config.period);
        logging::debug(Component::Fetch, Some(huc), &format!("GET {}", url));

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Http(response.status().as_u16()));
        }

        let body = response
            .text()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        parse_huc_response(&body, huc)
    }
}

// ============================================================================
// Tests
// ============================================================================
