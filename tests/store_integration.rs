/// Integration tests for the HUC8 store
///
/// These tests verify, against a fresh temporary store root each:
/// 1. Save → query round trip for a single watershed
/// 2. Idempotent saves (byte-identical files)
/// 3. Index ⇔ data file consistency after merges and across watersheds
/// 4. Site number ⇔ site name translation
/// 5. Cross-watershed result assembly in request order
/// 6. Failure modes: unknown sites, missing data files, failed index writes
///
/// Run with: cargo test --test store_integration

use chrono::{DateTime, TimeZone, Utc};
use std::fs;

use hucstore::error::StoreError;
use hucstore::index::MetadataIndex;
use hucstore::layout::StoreLayout;
use hucstore::model::{
    FetchResult, FetchedObservation, MetadataTriple, ObservationRecord, ProductFetch, SiteInfo,
    StatisticInfo, VariableInfo, PARAM_DISCHARGE, PARAM_STAGE,
};
use hucstore::query::{query_huc_data, query_site_data, query_site_huc, query_site_info, query_site_name};
use hucstore::save::{rebuild_index, save};
use hucstore::verify::verify_store;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const FOURMILE: (&str, &str) = ("06727500", "FOURMILE CREEK AT ORODELL, CO");
const BOULDER_75TH: (&str, &str) = ("06730200", "BOULDER CREEK AT N 75TH ST NEAR BOULDER, CO");
const ST_VRAIN: (&str, &str) = ("06725500", "MIDDLE BOULDER CREEK AT NEDERLAND, CO");
const BIG_THOMPSON: (&str, &str) = ("06741510", "BIG THOMPSON RIVER AT LOVELAND, CO");

fn temp_store() -> (tempfile::TempDir, StoreLayout) {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let layout = StoreLayout::open(tmp.path().join("store")).expect("Failed to open store");
    (tmp, layout)
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

fn obs(site_no: &str, hour: u32, value: f64) -> FetchedObservation {
    FetchedObservation {
        site_no: site_no.to_string(),
        record: ObservationRecord {
            datetime: at(hour),
            value,
            qualifier: "P".to_string(),
        },
    }
}

fn variable(parm_cd: &str) -> VariableInfo {
    let (name, unit) = if parm_cd == PARAM_STAGE {
        ("Gage height, ft", "ft")
    } else {
        ("Streamflow, ft&#179;/s", "ft3/s")
    };
    VariableInfo {
        parm_cd: parm_cd.to_string(),
        variable_nm: name.to_string(),
        variable_desc: String::new(),
        unit_cd: unit.to_string(),
        no_data_va: Some(-999999.0),
    }
}

fn product(huc: &str, parm_cd: &str, sites: &[(&str, &str)], records: Vec<FetchedObservation>) -> ProductFetch {
    ProductFetch {
        records,
        meta: MetadataTriple {
            sites: sites
                .iter()
                .map(|(site_no, name)| SiteInfo::new(site_no, name, huc))
                .collect(),
            variable: variable(parm_cd),
            statistic: StatisticInfo::default(),
        },
    }
}

fn fetch(products: Vec<(&str, ProductFetch)>) -> FetchResult {
    let mut result = FetchResult::new();
    for (parm_cd, p) in products {
        result.insert(parm_cd, p);
    }
    result
}

/// The fetch from the worked example: one site, three records, out of order.
fn fourmile_fetch() -> FetchResult {
    fetch(vec![(
        PARAM_DISCHARGE,
        product(
            "10190005",
            PARAM_DISCHARGE,
            &[FOURMILE],
            vec![
                obs(FOURMILE.0, 2, 4.71),
                obs(FOURMILE.0, 0, 4.58),
                obs(FOURMILE.0, 1, 4.62),
            ],
        ),
    )])
}

fn snapshot(layout: &StoreLayout) -> Vec<(String, Vec<u8>)> {
    let mut files = vec![(
        "index".to_string(),
        fs::read(layout.index_path()).unwrap_or_default(),
    )];
    for huc in layout.list_hucs().unwrap() {
        let bytes = fs::read(layout.data_file_path(&huc).unwrap()).unwrap();
        files.push((huc, bytes));
    }
    files
}

fn assert_consistent(layout: &StoreLayout) {
    let report = verify_store(layout).expect("verification should run");
    assert!(
        report.is_consistent(),
        "store should be consistent: orphans={:?} unindexed={:?} missing={:?} stale={}",
        report.orphan_rows,
        report.unindexed_entries,
        report.missing_files,
        report.index_flagged_stale
    );
    let stored = MetadataIndex::load(layout).unwrap().expect("index should exist");
    let rebuilt = MetadataIndex::rebuild(layout).unwrap();
    assert_eq!(stored, rebuilt, "stored index should equal a rebuild from data files");
}

// ---------------------------------------------------------------------------
// Save → query
// ---------------------------------------------------------------------------

#[test]
fn test_fourmile_example_round_trip() {
    let (_tmp, layout) = temp_store();
    let saved = save(&fourmile_fetch(), &layout).expect("save should succeed");

    assert_eq!(saved.huc, "10190005");
    assert!(saved.data_file.ends_with("huc/10190005.json"));
    assert_eq!(saved.index_file, layout.index_path());
    assert!(saved.paths().iter().all(|p| p.is_file()));

    let table = query_site_info(&["site_no", "station_nm"], &layout).unwrap();
    assert_eq!(table.columns, vec!["site_no", "station_nm"]);
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows[0][0], FOURMILE.0);
    assert_eq!(table.rows[0][1], FOURMILE.1);

    let records = query_site_data(&[FOURMILE.0], PARAM_DISCHARGE, &layout).unwrap();
    let values: Vec<f64> = records.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![4.58, 4.62, 4.71]);
    let times: Vec<_> = records.iter().map(|r| r.datetime).collect();
    assert_eq!(times, vec![at(0), at(1), at(2)]);
    assert!(records.iter().all(|r| r.huc_cd == "10190005" && r.parm_cd == PARAM_DISCHARGE));
}

#[test]
fn test_duplicate_timestamps_are_collapsed_on_save() {
    let (_tmp, layout) = temp_store();
    let f = fetch(vec![(
        PARAM_DISCHARGE,
        product(
            "10190005",
            PARAM_DISCHARGE,
            &[FOURMILE],
            vec![obs(FOURMILE.0, 1, 1.0), obs(FOURMILE.0, 1, 1.5), obs(FOURMILE.0, 0, 0.5)],
        ),
    )]);
    save(&f, &layout).unwrap();

    let records = query_site_data(&[FOURMILE.0], PARAM_DISCHARGE, &layout).unwrap();
    let values: Vec<f64> = records.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![0.5, 1.5], "later record for a timestamp should win");
}

#[test]
fn test_site_under_two_products_yields_two_info_rows() {
    let (_tmp, layout) = temp_store();
    let f = fetch(vec![
        (PARAM_DISCHARGE, product("10190005", PARAM_DISCHARGE, &[FOURMILE], vec![obs(FOURMILE.0, 0, 4.6)])),
        (PARAM_STAGE, product("10190005", PARAM_STAGE, &[FOURMILE], vec![obs(FOURMILE.0, 0, 1.9)])),
    ]);
    save(&f, &layout).unwrap();

    let table = query_site_info(&["site_no", "parm_cd", "unit_cd"], &layout).unwrap();
    assert_eq!(table.len(), 2);
    let units: Vec<_> = table.column("unit_cd").unwrap().into_iter().cloned().collect();
    assert_eq!(units, vec!["ft3/s", "ft"]);
}

// ---------------------------------------------------------------------------
// Idempotence and merge
// ---------------------------------------------------------------------------

#[test]
fn test_saving_same_fetch_twice_is_byte_identical() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();
    let first = snapshot(&layout);

    save(&fourmile_fetch(), &layout).unwrap();
    let second = snapshot(&layout);

    assert_eq!(first, second);
    assert_eq!(MetadataIndex::load(&layout).unwrap().unwrap().len(), 1);
    assert_eq!(query_site_data(&[FOURMILE.0], PARAM_DISCHARGE, &layout).unwrap().len(), 3);
    assert!(!layout.stale_marker_path().exists());
}

#[test]
fn test_merge_preserves_unrelated_products() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();

    let stage = fetch(vec![(
        PARAM_STAGE,
        product("10190005", PARAM_STAGE, &[FOURMILE], vec![obs(FOURMILE.0, 0, 1.92)]),
    )]);
    save(&stage, &layout).unwrap();

    assert_eq!(query_site_data(&[FOURMILE.0], PARAM_DISCHARGE, &layout).unwrap().len(), 3);
    assert_eq!(query_site_data(&[FOURMILE.0], PARAM_STAGE, &layout).unwrap().len(), 1);

    let table = query_site_info(&["parm_cd"], &layout).unwrap();
    let products: Vec<_> = table.column("parm_cd").unwrap().into_iter().cloned().collect();
    assert_eq!(products, vec![PARAM_DISCHARGE, PARAM_STAGE]);
    assert_consistent(&layout);
}

#[test]
fn test_refetched_product_replaces_prior_entry_wholesale() {
    let (_tmp, layout) = temp_store();
    let first = fetch(vec![(
        PARAM_DISCHARGE,
        product(
            "10190005",
            PARAM_DISCHARGE,
            &[FOURMILE, BOULDER_75TH],
            vec![obs(FOURMILE.0, 0, 4.5), obs(BOULDER_75TH.0, 0, 40.0)],
        ),
    )]);
    save(&first, &layout).unwrap();

    // Refetch covers one site only; the other site's rows and data go with it.
    let second = fetch(vec![(
        PARAM_DISCHARGE,
        product("10190005", PARAM_DISCHARGE, &[FOURMILE], vec![obs(FOURMILE.0, 5, 5.0)]),
    )]);
    save(&second, &layout).unwrap();

    let records = query_site_data(&[FOURMILE.0], PARAM_DISCHARGE, &layout).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].datetime, at(5));

    let err = query_site_data(&[BOULDER_75TH.0], PARAM_DISCHARGE, &layout).unwrap_err();
    assert!(matches!(err, StoreError::UnknownSite(_)), "got {:?}", err);
    assert_consistent(&layout);
}

#[test]
fn test_index_complete_across_watersheds() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();
    save(
        &fetch(vec![(
            PARAM_DISCHARGE,
            product("10190006", PARAM_DISCHARGE, &[BIG_THOMPSON], vec![obs(BIG_THOMPSON.0, 0, 120.0)]),
        )]),
        &layout,
    )
    .unwrap();
    save(
        &fetch(vec![(
            PARAM_STAGE,
            product("10190005", PARAM_STAGE, &[FOURMILE, BOULDER_75TH], Vec::new()),
        )]),
        &layout,
    )
    .unwrap();

    assert_eq!(layout.list_hucs().unwrap(), vec!["10190005", "10190006"]);
    assert_eq!(MetadataIndex::load(&layout).unwrap().unwrap().len(), 4);
    assert_consistent(&layout);
}

// ---------------------------------------------------------------------------
// Name translation
// ---------------------------------------------------------------------------

#[test]
fn test_site_name_translation_round_trips_for_every_row() {
    let (_tmp, layout) = temp_store();
    save(
        &fetch(vec![(
            PARAM_DISCHARGE,
            product("10190005", PARAM_DISCHARGE, &[FOURMILE, BOULDER_75TH, ST_VRAIN], Vec::new()),
        )]),
        &layout,
    )
    .unwrap();
    save(
        &fetch(vec![(
            PARAM_DISCHARGE,
            product("10190006", PARAM_DISCHARGE, &[BIG_THOMPSON], Vec::new()),
        )]),
        &layout,
    )
    .unwrap();

    let table = query_site_info(&["site_no", "station_nm"], &layout).unwrap();
    assert_eq!(table.len(), 4);
    for row in &table.rows {
        let id = row[0].as_str().unwrap();
        let name = row[1].as_str().unwrap();
        assert_eq!(query_site_name(id, &layout).unwrap(), name);
        assert_eq!(query_site_name(name, &layout).unwrap(), id);
    }

    assert_eq!(query_site_huc(BIG_THOMPSON.0, &layout).unwrap(), "10190006");
}

#[test]
fn test_unknown_site_name_fails() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();
    let err = query_site_name("FOURMILE CREEK", &layout).unwrap_err();
    assert!(matches!(err, StoreError::UnknownSite(_)), "got {:?}", err);
}

// ---------------------------------------------------------------------------
// Cross-watershed assembly
// ---------------------------------------------------------------------------

#[test]
fn test_cross_huc_query_concatenates_in_input_order() {
    let (_tmp, layout) = temp_store();
    save(
        &fetch(vec![(
            PARAM_DISCHARGE,
            product(
                "10190005",
                PARAM_DISCHARGE,
                &[FOURMILE, BOULDER_75TH],
                vec![obs(FOURMILE.0, 0, 4.6), obs(BOULDER_75TH.0, 0, 41.0), obs(BOULDER_75TH.0, 1, 42.0)],
            ),
        )]),
        &layout,
    )
    .unwrap();
    save(
        &fetch(vec![(
            PARAM_DISCHARGE,
            product("10190006", PARAM_DISCHARGE, &[BIG_THOMPSON], vec![obs(BIG_THOMPSON.0, 0, 120.0)]),
        )]),
        &layout,
    )
    .unwrap();

    let records = query_site_data(&[BIG_THOMPSON.0, FOURMILE.0, BOULDER_75TH.0], PARAM_DISCHARGE, &layout).unwrap();
    let attributed: Vec<_> = records
        .iter()
        .map(|r| (r.site_no.as_str(), r.huc_cd.as_str(), r.value))
        .collect();
    assert_eq!(
        attributed,
        vec![
            (BIG_THOMPSON.0, "10190006", 120.0),
            (FOURMILE.0, "10190005", 4.6),
            (BOULDER_75TH.0, "10190005", 41.0),
            (BOULDER_75TH.0, "10190005", 42.0),
        ]
    );
}

#[test]
fn test_known_site_without_product_contributes_nothing() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();
    let records = query_site_data(&[FOURMILE.0], PARAM_STAGE, &layout).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_huc_data_lists_every_site_of_a_product() {
    let (_tmp, layout) = temp_store();
    save(
        &fetch(vec![(
            PARAM_DISCHARGE,
            product(
                "10190005",
                PARAM_DISCHARGE,
                &[BOULDER_75TH, FOURMILE],
                vec![obs(FOURMILE.0, 0, 4.6), obs(BOULDER_75TH.0, 0, 41.0)],
            ),
        )]),
        &layout,
    )
    .unwrap();

    let records = query_huc_data("10190005", PARAM_DISCHARGE, &layout).unwrap();
    let sites: Vec<_> = records.iter().map(|r| r.site_no.as_str()).collect();
    assert_eq!(sites, vec![BOULDER_75TH.0, FOURMILE.0], "sites should come back in saved order");
    assert!(query_huc_data("10190099", PARAM_DISCHARGE, &layout).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[test]
fn test_unknown_site_fails_and_leaves_store_unmodified() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();
    let before = snapshot(&layout);

    let err = query_site_data(&["no-such-id"], PARAM_DISCHARGE, &layout).unwrap_err();
    assert!(matches!(err, StoreError::UnknownSite(ref s) if s == "no-such-id"), "got {:?}", err);

    // A known site ahead of the unknown one does not produce partial output.
    let err = query_site_data(&[FOURMILE.0, "no-such-id"], PARAM_DISCHARGE, &layout).unwrap_err();
    assert!(matches!(err, StoreError::UnknownSite(_)));

    assert_eq!(before, snapshot(&layout));
}

#[test]
fn test_missing_data_file_is_reported() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();
    fs::remove_file(layout.data_file_path("10190005").unwrap()).unwrap();

    let err = query_site_data(&[FOURMILE.0], PARAM_DISCHARGE, &layout).unwrap_err();
    assert!(matches!(err, StoreError::MissingDataFile { ref huc, .. } if huc == "10190005"), "got {:?}", err);

    let report = verify_store(&layout).unwrap();
    assert!(!report.is_consistent());
    assert_eq!(report.missing_files, vec!["10190005"]);
}

#[test]
fn test_failed_index_write_leaves_stale_flag_and_recovers() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();

    // Block the index staging file so the index write fails after the data
    // file has already been written.
    let staging = layout.root().join("site_metadata.json.tmp");
    fs::create_dir(&staging).unwrap();

    let big_thompson = fetch(vec![(
        PARAM_DISCHARGE,
        product("10190006", PARAM_DISCHARGE, &[BIG_THOMPSON], vec![obs(BIG_THOMPSON.0, 0, 120.0)]),
    )]);
    let err = save(&big_thompson, &layout).unwrap_err();
    assert!(matches!(err, StoreError::Persistence { .. }), "got {:?}", err);

    assert!(layout.has_data_file("10190006").unwrap(), "data file is written first");
    assert!(layout.stale_marker_path().exists(), "index should be flagged stale");
    let report = verify_store(&layout).unwrap();
    assert!(!report.is_consistent());
    assert_eq!(report.unindexed_entries.len(), 1);

    // Reads rebuild in memory and see the new watershed without writing.
    let records = query_site_data(&[BIG_THOMPSON.0], PARAM_DISCHARGE, &layout).unwrap();
    assert_eq!(records.len(), 1);
    assert!(layout.stale_marker_path().exists());

    fs::remove_dir(&staging).unwrap();
    assert_eq!(rebuild_index(&layout).unwrap(), 2);
    assert!(!layout.stale_marker_path().exists());
    assert_consistent(&layout);
}

#[test]
fn test_next_save_repairs_stale_index() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();

    let staging = layout.root().join("site_metadata.json.tmp");
    fs::create_dir(&staging).unwrap();
    let big_thompson = fetch(vec![(
        PARAM_DISCHARGE,
        product("10190006", PARAM_DISCHARGE, &[BIG_THOMPSON], Vec::new()),
    )]);
    assert!(save(&big_thompson, &layout).is_err());
    fs::remove_dir(&staging).unwrap();

    // An unrelated save rebuilds the whole index, picking up the orphan file.
    let stage = fetch(vec![(
        PARAM_STAGE,
        product("10190005", PARAM_STAGE, &[FOURMILE], vec![obs(FOURMILE.0, 0, 1.9)]),
    )]);
    save(&stage, &layout).unwrap();

    assert_eq!(query_site_huc(BIG_THOMPSON.0, &layout).unwrap(), "10190006");
    assert_consistent(&layout);
}

#[test]
fn test_index_is_regenerated_when_deleted() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();
    let original = MetadataIndex::load(&layout).unwrap().unwrap();
    fs::remove_file(layout.index_path()).unwrap();

    // Queries still resolve through an in-memory rebuild.
    assert_eq!(query_site_name(FOURMILE.0, &layout).unwrap(), FOURMILE.1);
    assert!(!layout.index_path().exists());

    rebuild_index(&layout).unwrap();
    assert_eq!(MetadataIndex::load(&layout).unwrap().unwrap(), original);
}

#[test]
fn test_non_finite_value_is_rejected_and_store_stays_usable() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();
    let before = snapshot(&layout);

    let bad = fetch(vec![(
        PARAM_DISCHARGE,
        product("10190005", PARAM_DISCHARGE, &[FOURMILE], vec![obs(FOURMILE.0, 3, f64::NAN)]),
    )]);
    let err = save(&bad, &layout).unwrap_err();
    assert!(matches!(err, StoreError::MalformedFetchResult(_)), "got {:?}", err);
    assert_eq!(snapshot(&layout), before, "rejected fetch must not touch the store");
    assert!(!layout.stale_marker_path().exists());

    let big_thompson = fetch(vec![(
        PARAM_DISCHARGE,
        product("10190006", PARAM_DISCHARGE, &[BIG_THOMPSON], vec![obs(BIG_THOMPSON.0, 0, 1.0)]),
    )]);
    save(&big_thompson, &layout).unwrap();
    assert_eq!(query_site_data(&[FOURMILE.0], PARAM_DISCHARGE, &layout).unwrap().len(), 3);
    assert_consistent(&layout);
}

#[test]
fn test_undecodable_index_is_rebuilt_by_reads_and_saves() {
    let (_tmp, layout) = temp_store();
    save(&fourmile_fetch(), &layout).unwrap();
    fs::write(layout.index_path(), b"{ not json").unwrap();

    assert_eq!(query_site_name(FOURMILE.0, &layout).unwrap(), FOURMILE.1);

    let stage = fetch(vec![(
        PARAM_STAGE,
        product("10190005", PARAM_STAGE, &[FOURMILE], vec![obs(FOURMILE.0, 0, 1.9)]),
    )]);
    save(&stage, &layout).unwrap();

    let table = query_site_info(&["parm_cd"], &layout).unwrap();
    assert_eq!(table.len(), 2);
    assert_consistent(&layout);
}
