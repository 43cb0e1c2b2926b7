//! Where region collections come from.

use eyre::WrapErr;
use log::debug;
use poll_promise::Promise;
use std::collections::HashMap;
use std::sync::Arc;

use crate::region::{CountTable, RegionCollection};
use crate::status::HealthStatus;
use crate::{CLIENT, MapError};

/// The result of fetching the regions of one health status.
pub type FetchResult = Result<RegionCollection, Arc<eyre::Report>>;

/// Supplies the regions and their counts for a health status.
pub trait RegionSource {
    /// Starts fetching the regions for `status`. `previous` is the collection currently shown,
    /// if any; sources may reuse its geometry and only replace the counts.
    fn fetch(
        &self,
        status: HealthStatus,
        previous: Option<Arc<RegionCollection>>,
    ) -> Promise<FetchResult>;
}

/// Fetches region outlines and per-status counts over HTTP.
///
/// The outlines are a GeoJSON feature collection, downloaded only when there is no previous
/// collection to take them from. The counts are a JSON array of records holding the region name
/// and its `count`; `{status}` in the counts URL is replaced by the status token.
///
/// # Example
///
/// ```
/// use egui_choropleth::source::HttpRegionSource;
/// use egui_choropleth::status::HealthStatus;
///
/// let source = HttpRegionSource::new(
///     "https://example.com/provinces.geojson",
///     "https://example.com/counts/{status}",
///     "adm2",
/// );
/// assert_eq!(source.counts_url(HealthStatus::Died), "https://example.com/counts/died");
/// ```
#[derive(Clone, Debug)]
pub struct HttpRegionSource {
    basemap_url: String,
    counts_url: String,
    name_property: String,
}

impl HttpRegionSource {
    /// Creates a source from the outline URL, the counts URL template and the property naming
    /// each region.
    pub fn new(
        basemap_url: impl Into<String>,
        counts_url: impl Into<String>,
        name_property: impl Into<String>,
    ) -> Self {
        Self {
            basemap_url: basemap_url.into(),
            counts_url: counts_url.into(),
            name_property: name_property.into(),
        }
    }

    /// The URL the counts of `status` are read from.
    pub fn counts_url(&self, status: HealthStatus) -> String {
        self.counts_url.replace("{status}", status.as_str())
    }
}

impl RegionSource for HttpRegionSource {
    fn fetch(
        &self,
        status: HealthStatus,
        previous: Option<Arc<RegionCollection>>,
    ) -> Promise<FetchResult> {
        let basemap_url = self.basemap_url.clone();
        let counts_url = self.counts_url(status);
        let name_property = self.name_property.clone();

        Promise::spawn_thread("fetch_regions", move || -> FetchResult {
            let result = (|| -> eyre::Result<RegionCollection> {
                let base = match previous {
                    Some(previous) => previous,
                    None => {
                        let geojson = get_text(&basemap_url)
                            .wrap_err_with(|| format!("Failed to download {}", basemap_url))?;
                        Arc::new(RegionCollection::from_geojson_str(&geojson, &name_property)?)
                    }
                };
                let counts = CountTable::from_json_str(&get_text(&counts_url)?, &name_property)?;
                Ok(base.with_counts(&counts))
            })()
            .wrap_err_with(|| format!("Failed to fetch `{}` counts from {}", status, counts_url));

            result.map_err(Arc::new)
        })
    }
}

fn get_text(url: &str) -> Result<String, MapError> {
    debug!("Downloading {}", url);
    let response = CLIENT.get(url).send()?;
    if !response.status().is_success() {
        return Err(MapError::DataDownloadError(response.status().to_string()));
    }
    Ok(response.text()?)
}

/// Serves collections that are already in memory, for instance data rendered ahead of time.
///
/// # Example
///
/// ```
/// use egui_choropleth::region::RegionCollection;
/// use egui_choropleth::source::{RegionSource, StaticRegionSource};
/// use egui_choropleth::status::HealthStatus;
///
/// let source = StaticRegionSource::new().with(HealthStatus::Active, RegionCollection::default());
/// let promise = source.fetch(HealthStatus::Active, None);
/// assert!(promise.ready().unwrap().is_ok());
/// ```
#[derive(Clone, Debug, Default)]
pub struct StaticRegionSource {
    collections: HashMap<HealthStatus, Arc<RegionCollection>>,
}

impl StaticRegionSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the collection served for `status`.
    pub fn with(mut self, status: HealthStatus, collection: RegionCollection) -> Self {
        self.insert(status, collection);
        self
    }

    /// Adds or replaces the collection served for `status`.
    pub fn insert(&mut self, status: HealthStatus, collection: RegionCollection) {
        self.collections.insert(status, Arc::new(collection));
    }
}

impl RegionSource for StaticRegionSource {
    fn fetch(
        &self,
        status: HealthStatus,
        _previous: Option<Arc<RegionCollection>>,
    ) -> Promise<FetchResult> {
        let result = match self.collections.get(&status) {
            Some(collection) => Ok(RegionCollection::clone(collection)),
            None => Err(Arc::new(eyre::eyre!("No regions for `{}`", status))),
        };
        Promise::from_ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::tests::squares;

    #[test]
    fn counts_url_template() {
        let source = HttpRegionSource::new("base", "https://stats/{status}/prov", "adm2");
        assert_eq!(
            source.counts_url(HealthStatus::Asymptomatic),
            "https://stats/asymptomatic/prov"
        );
    }

    #[test]
    fn static_source_serves_known_statuses() {
        let source = StaticRegionSource::new()
            .with(HealthStatus::Active, squares(&[Some(1), Some(2)]))
            .with(HealthStatus::Died, squares(&[Some(0)]));

        let active = source.fetch(HealthStatus::Active, None).block_and_take().unwrap();
        assert_eq!(active.len(), 2);

        let died = source
            .fetch(HealthStatus::Died, Some(Arc::new(active)))
            .block_and_take()
            .unwrap();
        assert_eq!(died.samples(), vec![0.0]);
    }

    #[test]
    fn static_source_fails_for_unknown_status() {
        let source = StaticRegionSource::new();
        let err = source
            .fetch(HealthStatus::Severe, None)
            .block_and_take()
            .unwrap_err();
        assert!(err.to_string().contains("severe"));
    }
}
