/// Getting watershed data into the store.
///
/// The store itself never talks to the network; it consumes anything that
/// implements [`Fetch`]. `nwis` is the USGS Water Services implementation.
///
/// Submodules:
/// - `nwis`: WaterML-JSON client for the NWIS instantaneous/daily values services.

pub mod nwis;

use crate::error::FetchError;
use crate::layout::{self, StoreLayout};
use crate::logging::{self, Component};
use crate::model::FetchResult;
use crate::save::{self, SavedFiles};

/// A source of watershed data.
///
/// Implementations apply their own timeout policy. Failures are returned as
/// `FetchError`; callers decide whether to retry using
/// [`FetchError::is_retryable`].
pub trait Fetch {
    /// Fetches every site in `huc` for the given parameter codes.
    fn fetch_huc(&self, huc: &str, parm_cds: &[&str]) -> Result<FetchResult, FetchError>;
}

/// Fetches one watershed and saves it. No retries.
pub fn fetch_and_save<F: Fetch + ?Sized>(
    fetcher: &F,
    huc: &str,
    parm_cds: &[&str],
    layout: &StoreLayout,
) -> Result<SavedFiles, FetchError> {
    layout::validate_huc8(huc)?;
    for parm_cd in parm_cds {
        layout::validate_product(parm_cd)?;
    }

    logging::info(
        Component::Fetch,
        Some(huc),
        &format!("Fetching parameter(s) {}", parm_cds.join(",")),
    );
    let fetch = fetcher.fetch_huc(huc, parm_cds).inspect_err(|e| {
        logging::log_fetch_failure(huc, "fetch_huc", e);
    })?;

    Ok(save::save(&fetch, layout)?)
}
