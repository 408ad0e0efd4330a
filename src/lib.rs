//! Local, HUC8-partitioned store for hydrologic station observations.
//!
//! Data fetched for a watershed is kept in one file per HUC8, and a shared
//! metadata index over all of them resolves site numbers, site names and
//! watersheds so analyses can run offline.
//!
//! ```no_run
//! use hucstore::{layout::StoreLayout, query, save};
//! # fn fetch() -> hucstore::model::FetchResult { unimplemented!() }
//!
//! let layout = StoreLayout::open("hucstore_data")?;
//! save::save(&fetch(), &layout)?;
//! let name = query::query_site_name("06727500", &layout)?;
//! let flow = query::query_site_data(&["06727500"], "00060", &layout)?;
//! # Ok::<(), hucstore::error::StoreError>(())
//! ```

pub mod config;
pub mod error;
pub mod hucfile;
pub mod index;
pub mod ingest;
pub mod layout;
pub mod logging;
pub mod model;
mod persist;
pub mod query;
pub mod save;
pub mod verify;
