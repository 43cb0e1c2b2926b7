//! Configuration for the basemap provider and for the choropleth layer.

use egui::Color32;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::TileId;
use crate::projection::GeoPos;
use crate::status::HealthStatus;

/// Configuration for a map provider.
pub trait MapConfig {
    /// Returns the URL for a given tile.
    fn tile_url(&self, tile: &TileId) -> String;

    /// Returns the attribution text to be displayed on the map. If returns `None`, no attribution is shown.
    fn attribution(&self) -> Option<&String>;

    /// Returns the attribution URL to be linked from the attribution text.
    fn attribution_url(&self) -> Option<&String>;

    /// The default geographical center of the map.
    fn default_center(&self) -> GeoPos;

    /// The default zoom level of the map.
    fn default_zoom(&self) -> u8;
}

/// The center of the Philippines, where the case data is located.
const PHILIPPINES: GeoPos = GeoPos {
    lon: 121.774,
    lat: 12.8797,
};

/// Configuration for the OpenStreetMap tile server.
///
/// # Example
///
/// ```
/// use egui_choropleth::config::OpenStreetMapConfig;
/// let config = OpenStreetMapConfig::default();
/// ```
#[cfg(feature = "openstreetmap")]
pub struct OpenStreetMapConfig {
    base_url: String,
    attribution: String,
    attribution_url: String,
    default_center: GeoPos,
    default_zoom: u8,
}

#[cfg(feature = "openstreetmap")]
impl Default for OpenStreetMapConfig {
    fn default() -> Self {
        Self {
            base_url: "https://tile.openstreetmap.org".to_string(),
            attribution: "© OpenStreetMap contributors".to_string(),
            attribution_url: "https://www.openstreetmap.org".to_string(),
            default_center: PHILIPPINES,
            default_zoom: 5,
        }
    }
}

#[cfg(feature = "openstreetmap")]
impl MapConfig for OpenStreetMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        format!("{}/{}/{}/{}.png", self.base_url, tile.z, tile.x, tile.y)
    }

    fn attribution(&self) -> Option<&String> {
        Some(&self.attribution)
    }

    fn attribution_url(&self) -> Option<&String> {
        Some(&self.attribution_url)
    }

    fn default_center(&self) -> GeoPos {
        self.default_center
    }

    fn default_zoom(&self) -> u8 {
        self.default_zoom
    }
}

/// A dynamic map configuration that allows defining a custom tile URL function at runtime.
///
/// # Example
///
/// ```
/// use egui_choropleth::config::DynMapConfig;
/// let config = DynMapConfig::new(|tile| format!("https://my-tile-server/{}/{}/{}.png", tile.z, tile.x, tile.y));
/// ```
pub struct DynMapConfig {
    tile_url: Box<dyn Fn(&TileId) -> String>,
}

impl DynMapConfig {
    /// Creates a new `DynMapConfig` with a custom tile URL function.
    pub fn new(tile_url: impl Fn(&TileId) -> String + 'static) -> Self {
        Self {
            tile_url: Box::new(tile_url),
        }
    }
}

impl MapConfig for DynMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        (self.tile_url)(tile)
    }

    fn attribution(&self) -> Option<&String> {
        None
    }

    fn attribution_url(&self) -> Option<&String> {
        None
    }

    fn default_center(&self) -> GeoPos {
        PHILIPPINES
    }

    fn default_zoom(&self) -> u8 {
        5
    }
}

/// Styling and data settings of the choropleth layer.
///
/// Colors are hex strings (`#rrggbb` or `#rrggbbaa`) so the configuration can be loaded from
/// JSON.
///
/// # Example
///
/// ```
/// use egui_choropleth::config::ChoroplethConfig;
/// let config: ChoroplethConfig = serde_json::from_str(r#"{ "layer_id": "cases" }"#).unwrap();
/// assert_eq!(config.layer_id, "cases");
/// assert_eq!(config.palette().len(), 6);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoroplethConfig {
    /// Identifier of the choropleth layer (and of the data source it draws).
    pub layer_id: String,

    /// Colors of the classification, from the lowest to the highest counts.
    pub palette: Vec<String>,

    /// Fill color used before any classification has been applied, and for regions without a
    /// count.
    pub base_fill: String,

    /// Color of the region outlines.
    pub outline: String,

    /// Fill opacity of the hovered region.
    pub hover_opacity: f32,

    /// Fill opacity of every other region.
    pub fill_opacity: f32,

    /// The property holding the region name.
    pub name_property: String,

    /// The filter shown before the user picks one.
    pub default_status: HealthStatus,

    /// Title of the legend.
    pub legend_title: String,

    /// Thousands separator used when formatting counts.
    pub group_separator: char,
}

impl Default for ChoroplethConfig {
    fn default() -> Self {
        Self {
            layer_id: "ph-covid19".to_string(),
            palette: ["#ffffff", "#fef0d9", "#fdcc8a", "#fc8d59", "#e34a33", "#b30000"]
                .into_iter()
                .map(String::from)
                .collect(),
            base_fill: "#ffffff".to_string(),
            outline: "#000000".to_string(),
            hover_opacity: 1.0,
            fill_opacity: 0.7,
            name_property: "adm2".to_string(),
            default_status: HealthStatus::default(),
            legend_title: "Number of Cases".to_string(),
            group_separator: ',',
        }
    }
}

impl ChoroplethConfig {
    /// The classification palette. Entries that are not valid hex colors are skipped.
    pub fn palette(&self) -> Vec<Color32> {
        self.palette.iter().filter_map(|s| parse_color(s)).collect()
    }

    /// The base fill color, white if invalid.
    pub fn base_fill(&self) -> Color32 {
        parse_color(&self.base_fill).unwrap_or(Color32::WHITE)
    }

    /// The outline color, black if invalid.
    pub fn outline(&self) -> Color32 {
        parse_color(&self.outline).unwrap_or(Color32::BLACK)
    }
}

fn parse_color(s: &str) -> Option<Color32> {
    match Color32::from_hex(s) {
        Ok(color) => Some(color),
        Err(e) => {
            warn!("Ignoring invalid color `{}`: {:?}", s, e);
            None
        }
    }
}
