#![warn(missing_docs)]

//! A choropleth map widget for `egui`.
//!
//! Regions read from a GeoJSON feature collection are drawn on top of a slippy basemap and
//! filled with a color derived from their case count. The colors are recomputed from quantiles of
//! the counts every time new data is loaded, a legend follows the colors, and the region under the
//! pointer is highlighted.
//!
//! [`Map`] is the map engine: basemap tiles, panning and zooming, a stack of layers and an event
//! queue. [`controller::ChoroplethMap`] builds the choropleth on top of it and keeps the data in
//! sync with a health-status filter.
//!
//! # Example
//!
//! ```no_run
//! use eframe::egui;
//! use egui_choropleth::config::{ChoroplethConfig, OpenStreetMapConfig};
//! use egui_choropleth::controller::ChoroplethMap;
//! use egui_choropleth::source::HttpRegionSource;
//!
//! struct MyApp {
//!     map: ChoroplethMap,
//! }
//!
//! impl Default for MyApp {
//!     fn default() -> Self {
//!         let source = HttpRegionSource::new(
//!             "https://example.com/provinces.geojson",
//!             "https://example.com/counts/{status}",
//!             "adm2",
//!         );
//!         Self {
//!             map: ChoroplethMap::new(
//!                 OpenStreetMapConfig::default(),
//!                 ChoroplethConfig::default(),
//!                 source,
//!             ),
//!         }
//!     }
//! }
//!
//! impl eframe::App for MyApp {
//!     fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
//!         egui::CentralPanel::default()
//!             .frame(egui::Frame::NONE)
//!             .show(ctx, |ui| {
//!                 ui.add(&mut self.map);
//!             });
//!     }
//! }
//! ```

mod basemap;

/// Quantile classification of counts into color bins.
pub mod classify;

/// Configuration traits and types for the map widget.
pub mod config;

/// The choropleth map and its lifecycle.
pub mod controller;

/// Map events and their handlers.
pub mod events;

/// Hover highlighting and click popups.
pub mod hover;

/// Layers drawn on top of the basemap.
pub mod layers;

/// Map projection.
pub mod projection;

/// Generation-numbered data refreshes.
pub mod refresh;

/// Regions and their case counts.
pub mod region;

/// Where regions and their counts come from.
pub mod source;

/// The health-status filter.
pub mod status;

/// Fill colors and legends derived from color bins.
pub mod style;

use eframe::egui;
use egui::{CursorIcon, Rect, Response, Sense, Ui, Vec2, Widget};
use log::debug;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

use crate::basemap::Basemap;
use crate::config::MapConfig;
use crate::events::{EventKind, MapEvent, Registration};
use crate::hover::Popup;
use crate::layers::Layer;
use crate::layers::choropleth::ChoroplethLayer;
use crate::projection::{GeoPos, MapProjection};
use crate::region::RegionCollection;

// The size of a map tile in pixels.
pub(crate) const TILE_SIZE: u32 = 256;
/// The minimum zoom level.
pub const MIN_ZOOM: u8 = 0;
/// The maximum zoom level.
pub const MAX_ZOOM: u8 = 19;

// Reuse the reqwest client for all downloads by making it a static variable.
pub(crate) static CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .expect("Failed to build reqwest client")
});

/// Events waiting to be dispatched to the handlers of a map.
pub type EventQueue = VecDeque<MapEvent>;

/// Errors that can occur while using the map widget.
#[derive(Error, Debug)]
pub enum MapError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// A map tile failed to download.
    #[error("A map tile failed to download. HTTP Status: `{0}`")]
    TileDownloadError(String),

    /// The downloaded tile bytes could not be converted to an image.
    #[error("Unable to convert downloaded map tile bytes as image")]
    TileBytesConversionError(#[from] image::ImageError),

    /// Region data failed to download.
    #[error("Region data failed to download. HTTP Status: `{0}`")]
    DataDownloadError(String),

    /// The region outlines are not valid GeoJSON.
    #[error("Invalid GeoJSON")]
    GeoJson(#[from] geojson::Error),

    /// The region counts are not valid JSON.
    #[error("Invalid JSON")]
    Json(#[from] serde_json::Error),

    /// The region outlines are GeoJSON, but not a feature collection.
    #[error("Expected a GeoJSON feature collection")]
    NotAFeatureCollection,

    /// A health-status token that is not known.
    #[error("Unknown health status `{0}`")]
    UnknownHealthStatus(String),

    /// No layer with the id, or the layer is of another kind.
    #[error("No choropleth layer with id `{0}`")]
    UnknownLayer(String),
}

/// A unique identifier for a map tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileId {
    /// The zoom level.
    pub z: u8,

    /// The x-coordinate of the tile.
    pub x: u32,

    /// The y-coordinate of the tile.
    pub y: u32,
}

impl TileId {
    fn to_url(&self, config: &dyn MapConfig) -> String {
        config.tile_url(self)
    }
}

/// The map widget.
pub struct Map {
    /// The geographical center of the map.
    pub center: GeoPos,

    /// The zoom level of the map.
    pub zoom: u8,

    /// The geographical position under the mouse pointer, if any.
    pub mouse_pos: Option<GeoPos>,

    basemap: Basemap,

    // Drawn in order; the last one is on top and gets input first.
    layers: Vec<(String, Box<dyn Layer>)>,

    events: EventQueue,
    handlers: Vec<Registration>,

    popup: Option<Popup>,
    cursor: Option<CursorIcon>,
    loaded: bool,
}

impl Map {
    /// Creates a new `Map` widget.
    ///
    /// # Arguments
    ///
    /// * `config` - A type that implements `MapConfig`, which provides configuration for the map.
    pub fn new<C: MapConfig + 'static>(config: C) -> Self {
        let center = config.default_center();
        let zoom = config.default_zoom();
        Self {
            center,
            zoom,
            mouse_pos: None,
            basemap: Basemap::new(Box::new(config)),
            layers: Vec::new(),
            events: EventQueue::new(),
            handlers: Vec::new(),
            popup: None,
            cursor: None,
            loaded: false,
        }
    }

    /// Adds a layer on top of the others. A layer with the same id is replaced in place.
    pub fn add_layer(&mut self, id: impl Into<String>, layer: impl Layer) {
        let id = id.into();
        let layer: Box<dyn Layer> = Box::new(layer);
        match self.layers.iter_mut().find(|(layer_id, _)| *layer_id == id) {
            Some((_, existing)) => *existing = layer,
            None => self.layers.push((id, layer)),
        }
    }

    /// Removes a layer. Returns whether it existed.
    pub fn remove_layer(&mut self, id: &str) -> bool {
        let len = self.layers.len();
        self.layers.retain(|(layer_id, _)| layer_id != id);
        self.layers.len() != len
    }

    /// Whether a layer with the id exists.
    pub fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|(layer_id, _)| layer_id == id)
    }

    /// Gets a reference to a layer by its id, if it is of type `T`.
    pub fn layer<T: Layer>(&self, id: &str) -> Option<&T> {
        self.layers
            .iter()
            .find(|(layer_id, _)| layer_id == id)
            .and_then(|(_, layer)| layer.as_any().downcast_ref::<T>())
    }

    /// Gets a mutable reference to a layer by its id, if it is of type `T`.
    pub fn layer_mut<T: Layer>(&mut self, id: &str) -> Option<&mut T> {
        self.layers
            .iter_mut()
            .find(|(layer_id, _)| layer_id == id)
            .and_then(|(_, layer)| layer.as_any_mut().downcast_mut::<T>())
    }

    /// The choropleth layer with the id.
    pub fn choropleth(&self, id: &str) -> Result<&ChoroplethLayer, MapError> {
        self.layer::<ChoroplethLayer>(id)
            .ok_or_else(|| MapError::UnknownLayer(id.to_string()))
    }

    /// The choropleth layer with the id, mutably.
    pub fn choropleth_mut(&mut self, id: &str) -> Result<&mut ChoroplethLayer, MapError> {
        self.layer_mut::<ChoroplethLayer>(id)
            .ok_or_else(|| MapError::UnknownLayer(id.to_string()))
    }

    /// Replaces the regions of a choropleth layer.
    ///
    /// Emits [`MapEvent::SourceDataLoading`] and then [`MapEvent::SourceData`] for the layer;
    /// they reach the handlers on the next dispatch.
    pub fn set_layer_data(&mut self, id: &str, data: RegionCollection) -> Result<(), MapError> {
        debug!("Setting {} regions on layer `{}`", data.len(), id);
        self.choropleth_mut(id)?.set_data(Arc::new(data));
        self.emit(MapEvent::SourceDataLoading {
            layer_id: id.to_string(),
        });
        self.emit(MapEvent::SourceData {
            layer_id: id.to_string(),
        });
        Ok(())
    }

    /// Runs `handler` for every event of the kind.
    pub fn on(&mut self, kind: EventKind, handler: impl FnMut(&mut Map, &MapEvent) + 'static) {
        self.handlers
            .push(Registration::new(kind, None, false, Box::new(handler)));
    }

    /// Runs `handler` for every event of the kind concerning the layer.
    pub fn on_layer(
        &mut self,
        kind: EventKind,
        layer_id: &str,
        handler: impl FnMut(&mut Map, &MapEvent) + 'static,
    ) {
        self.handlers.push(Registration::new(
            kind,
            Some(layer_id.to_string()),
            false,
            Box::new(handler),
        ));
    }

    /// Runs `handler` for the next event of the kind only.
    pub fn once(&mut self, kind: EventKind, handler: impl FnMut(&mut Map, &MapEvent) + 'static) {
        self.handlers
            .push(Registration::new(kind, None, true, Box::new(handler)));
    }

    /// Queues an event for the next dispatch.
    pub fn emit(&mut self, event: MapEvent) {
        self.events.push_back(event);
    }

    /// Runs the handlers of every queued event, including events queued by the handlers
    /// themselves.
    pub fn dispatch_events(&mut self) {
        while let Some(event) = self.events.pop_front() {
            let mut handlers = std::mem::take(&mut self.handlers);
            handlers.retain_mut(|registration| registration.handle(self, &event));
            // Handlers registered while dispatching.
            handlers.append(&mut self.handlers);
            self.handlers = handlers;
        }
    }

    /// Marks the map as loaded and emits [`MapEvent::Load`]. Called by the widget the first time
    /// it is shown; later calls do nothing.
    pub fn load(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        self.emit(MapEvent::Load);
    }

    /// Whether the map has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Sets the cursor shown while the pointer is over the map. `None` restores the default.
    pub fn set_cursor(&mut self, cursor: Option<CursorIcon>) {
        self.cursor = cursor;
    }

    /// The cursor shown while the pointer is over the map.
    pub fn cursor(&self) -> Option<CursorIcon> {
        self.cursor
    }

    /// Opens a popup, replacing the one already open.
    pub fn open_popup(&mut self, popup: Popup) {
        self.popup = Some(popup);
    }

    /// Closes the open popup.
    pub fn close_popup(&mut self) {
        self.popup = None;
    }

    /// The open popup.
    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    /// Handles user input for panning and zooming.
    fn handle_input(&mut self, ui: &Ui, rect: &Rect, response: &Response) {
        // Handle panning
        if response.dragged() {
            let delta = response.drag_delta();
            let center_in_tiles_x = lon_to_x(self.center.lon, self.zoom);
            let center_in_tiles_y = lat_to_y(self.center.lat, self.zoom);

            let mut new_center_x = center_in_tiles_x - (delta.x as f64 / TILE_SIZE as f64);
            let mut new_center_y = center_in_tiles_y - (delta.y as f64 / TILE_SIZE as f64);

            // Clamp the new center to the map boundaries.
            let world_size_in_tiles = 2.0_f64.powi(self.zoom as i32);
            let view_size_in_tiles_x = rect.width() as f64 / TILE_SIZE as f64;
            let view_size_in_tiles_y = rect.height() as f64 / TILE_SIZE as f64;

            let min_center_x = view_size_in_tiles_x / 2.0;
            let max_center_x = world_size_in_tiles - view_size_in_tiles_x / 2.0;
            let min_center_y = view_size_in_tiles_y / 2.0;
            let max_center_y = world_size_in_tiles - view_size_in_tiles_y / 2.0;

            // If the map is smaller than the viewport, center it. Otherwise, clamp the center.
            new_center_x = if min_center_x > max_center_x {
                world_size_in_tiles / 2.0
            } else {
                new_center_x.clamp(min_center_x, max_center_x)
            };
            new_center_y = if min_center_y > max_center_y {
                world_size_in_tiles / 2.0
            } else {
                new_center_y.clamp(min_center_y, max_center_y)
            };

            self.center = GeoPos {
                lon: x_to_lon(new_center_x, self.zoom),
                lat: y_to_lat(new_center_y, self.zoom),
            };
        }

        let projection = MapProjection::new(self.zoom, self.center, *rect);

        // Handle double-click to zoom and center
        if response.double_clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                let new_zoom = (self.zoom + 1).clamp(MIN_ZOOM, MAX_ZOOM);
                if new_zoom != self.zoom {
                    // Center the map on the clicked location before zooming in.
                    self.center = projection.unproject(pointer_pos);
                    self.zoom = new_zoom;
                }
            }
        }

        // Handle zooming and mouse position
        let Some(mouse_pos) = response.hover_pos().filter(|_| response.hovered()) else {
            self.mouse_pos = None;
            return;
        };
        let target = projection.unproject(mouse_pos);
        self.mouse_pos = Some(target);

        let scroll = ui.input(|i| i.raw_scroll_delta.y);
        if scroll == 0.0 {
            return;
        }
        let new_zoom = self.zoom_target(scroll.signum() as i32, rect.size());
        if new_zoom != self.zoom {
            self.zoom = new_zoom;

            // Adjust the map center so the geo-coordinate under the mouse remains the same
            let mouse_rel = mouse_pos - rect.center();
            let new_center_x =
                lon_to_x(target.lon, new_zoom) - mouse_rel.x as f64 / TILE_SIZE as f64;
            let new_center_y =
                lat_to_y(target.lat, new_zoom) - mouse_rel.y as f64 / TILE_SIZE as f64;

            self.center = GeoPos {
                lon: x_to_lon(new_center_x, new_zoom),
                lat: y_to_lat(new_center_y, new_zoom),
            };
        }
    }

    /// The zoom level `delta` steps away from the current one, within the zoom range. Zooming
    /// out stops where the world would become smaller than a view of `view_size`.
    fn zoom_target(&self, delta: i32, view_size: Vec2) -> u8 {
        let new_zoom = (self.zoom as i32 + delta).clamp(MIN_ZOOM as i32, MAX_ZOOM as i32) as u8;
        if new_zoom < self.zoom {
            let world_pixel_size = 2.0_f64.powi(new_zoom as i32) * TILE_SIZE as f64;
            if world_pixel_size < view_size.x as f64 || world_pixel_size < view_size.y as f64 {
                return self.zoom;
            }
        }
        new_zoom
    }

    /// Zooms in (positive `delta`) or out around the center of the map, for a view of
    /// `view_size` pixels. Returns whether the zoom level changed.
    pub fn zoom_by(&mut self, delta: i32, view_size: Vec2) -> bool {
        let new_zoom = self.zoom_target(delta, view_size);
        let changed = new_zoom != self.zoom;
        self.zoom = new_zoom;
        changed
    }

    /// A click on the map that hit no feature closes the popup. Clicks on features queue a
    /// [`MapEvent::Click`] whose handlers decide about the popup.
    fn close_popup_unless_feature_clicked(&mut self) {
        let feature_clicked = self
            .events
            .iter()
            .any(|event| event.kind() == EventKind::Click);
        if !feature_clicked {
            self.close_popup();
        }
    }

    /// Draws the zoom buttons in the lower right corner of `rect`.
    fn draw_zoom_controls(&mut self, ui: &mut Ui, rect: Rect) {
        let mut delta = 0;
        egui::Area::new(ui.id().with("zoom_controls"))
            .fixed_pos(rect.right_bottom())
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-10.0, -30.0))
            .show(ui.ctx(), |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.vertical(|ui| {
                        if ui.small_button("+").on_hover_text("Zoom in").clicked() {
                            delta = 1;
                        }
                        if ui.small_button("-").on_hover_text("Zoom out").clicked() {
                            delta = -1;
                        }
                    });
                });
            });

        if delta != 0 && self.zoom_by(delta, rect.size()) {
            ui.ctx().request_repaint();
        }
    }

    /// Draws the open popup above its anchor, if the anchor is in view.
    fn draw_popup(&mut self, ui: &mut Ui, projection: &MapProjection) {
        let Some(popup) = &self.popup else {
            return;
        };
        let anchor = projection.project(popup.anchor);
        if !projection.widget_rect().contains(anchor) {
            return;
        }

        let mut close = false;
        egui::Area::new(ui.id().with("popup"))
            .fixed_pos(anchor)
            .pivot(egui::Align2::CENTER_BOTTOM)
            .show(ui.ctx(), |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.strong(&popup.content.name);
                        if ui.small_button("✕").clicked() {
                            close = true;
                        }
                    });
                    ui.horizontal(|ui| {
                        ui.label("Count:");
                        ui.label(popup.content.formatted_count());
                    });
                });
            });

        if close {
            self.close_popup();
        }
    }
}

/// Converts longitude to the x-coordinate of a tile at a given zoom level.
pub(crate) fn lon_to_x(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * (2.0_f64.powi(zoom as i32))
}

/// Converts latitude to the y-coordinate of a tile at a given zoom level.
pub(crate) fn lat_to_y(lat: f64, zoom: u8) -> f64 {
    (1.0 - lat.to_radians().tan().asinh() / std::f64::consts::PI) / 2.0
        * (2.0_f64.powi(zoom as i32))
}

/// Converts the x-coordinate of a tile to longitude at a given zoom level.
pub(crate) fn x_to_lon(x: f64, zoom: u8) -> f64 {
    x / (2.0_f64.powi(zoom as i32)) * 360.0 - 180.0
}

/// Converts the y-coordinate of a tile to latitude at a given zoom level.
pub(crate) fn y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * y / (2.0_f64.powi(zoom as i32));
    n.sinh().atan().to_degrees()
}

impl Widget for &mut Map {
    fn ui(self, ui: &mut Ui) -> Response {
        let (rect, response) =
            ui.allocate_exact_size(ui.available_size(), Sense::drag().union(Sense::click()));

        self.load();

        // Layers get the input first, topmost first.
        let projection = MapProjection::new(self.zoom, self.center, rect);
        let mut consumed = false;
        for (id, layer) in self.layers.iter_mut().rev() {
            if layer.handle_input(id, &response, &projection, &mut self.events) {
                consumed = true;
                break;
            }
        }
        if !consumed {
            self.handle_input(ui, &rect, &response);
        }
        if response.clicked() {
            self.close_popup_unless_feature_clicked();
        }

        self.dispatch_events();

        if response.hovered() {
            if let Some(cursor) = self.cursor {
                ui.ctx().set_cursor_icon(cursor);
            }
        }

        let painter = ui.painter_at(rect);
        self.basemap
            .draw(ui, &painter, rect, self.center, self.zoom);

        let projection = MapProjection::new(self.zoom, self.center, rect);
        for (_, layer) in &self.layers {
            layer.draw(&painter, &projection);
        }

        self.draw_popup(ui, &projection);
        self.draw_zoom_controls(ui, rect);
        self.basemap.draw_attribution(ui, rect);

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DynMapConfig, OpenStreetMapConfig};
    use crate::hover::PopupContent;
    use crate::region::tests::squares;
    use std::cell::RefCell;
    use std::rc::Rc;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_coord_conversion_roundtrip() {
        let zoom: u8 = 10;
        for (original_lon, original_lat) in [(121.774, 12.8797), (-122.4194, 37.7749)] {
            let x = lon_to_x(original_lon, zoom);
            let y = lat_to_y(original_lat, zoom);

            assert!((original_lon - x_to_lon(x, zoom)).abs() < EPSILON);
            assert!((original_lat - y_to_lat(y, zoom)).abs() < EPSILON);
        }
    }

    #[test]
    fn test_y_to_lat_conversion() {
        // y, zoom, expected_lat
        let test_cases = vec![
            // Equator
            (0.5, 0, 0.0),
            (128.0, 8, 0.0),
            // Near poles (Mercator projection limits)
            (0.0, 0, 85.0511287798),
            (1.0, 0, -85.0511287798),
            (0.0, 8, 85.0511287798),
            (256.0, 8, -85.0511287798),
        ];

        for (y, zoom, expected_lat) in test_cases {
            assert!((y_to_lat(y, zoom) - expected_lat).abs() < EPSILON);
        }
    }

    #[test]
    fn test_lon_to_x_conversion() {
        // lon, zoom, expected_x
        let test_cases = vec![
            // Center of the map
            (0.0, 0, 0.5),
            (0.0, 8, 128.0),
            // Edges of the map
            (-180.0, 0, 0.0),
            (180.0, 0, 1.0),
            (-180.0, 8, 0.0),
            (180.0, 8, 256.0),
        ];

        for (lon, zoom, expected_x) in test_cases {
            assert!((lon_to_x(lon, zoom) - expected_x).abs() < EPSILON);
        }
    }

    #[test]
    fn test_tile_id_to_url() {
        let config = OpenStreetMapConfig::default();
        let tile_id = TileId {
            z: 5,
            x: 26,
            y: 14,
        };
        assert_eq!(
            tile_id.to_url(&config),
            "https://tile.openstreetmap.org/5/26/14.png"
        );
    }

    #[test]
    fn test_map_new() {
        let config = OpenStreetMapConfig::default();
        let default_center = config.default_center();
        let default_zoom = config.default_zoom();

        let map = Map::new(config);

        assert_eq!(map.center, default_center);
        assert_eq!(map.zoom, default_zoom);
        assert!(map.mouse_pos.is_none());
        assert_eq!(map.basemap.cached(), 0);
        assert!(!map.is_loaded());
        assert!(map.popup().is_none());
    }

    fn map() -> Map {
        Map::new(DynMapConfig::new(|_| String::new()))
    }

    #[test]
    fn layers_by_id_and_type() {
        let mut map = map();
        map.add_layer("cases", ChoroplethLayer::default());
        assert!(map.has_layer("cases"));
        assert!(map.layer::<ChoroplethLayer>("cases").is_some());
        assert!(map.choropleth("other").is_err());

        map.layer_mut::<ChoroplethLayer>("cases").unwrap().fill_opacity = 0.5;
        map.add_layer("cases", ChoroplethLayer::default());
        assert_eq!(map.choropleth("cases").unwrap().fill_opacity, 0.7);
        assert_eq!(map.layers.len(), 1);

        assert!(map.remove_layer("cases"));
        assert!(!map.remove_layer("cases"));
        assert!(matches!(
            map.choropleth_mut("cases"),
            Err(MapError::UnknownLayer(id)) if id == "cases"
        ));
    }

    #[test]
    fn set_layer_data_emits_loading_then_data() {
        let mut map = map();
        map.add_layer("cases", ChoroplethLayer::default());

        let seen = Rc::new(RefCell::new(Vec::new()));
        for kind in [EventKind::SourceDataLoading, EventKind::SourceData] {
            let log = seen.clone();
            map.on_layer(kind, "cases", move |map, event| {
                let len = map.choropleth("cases").unwrap().data().len();
                log.borrow_mut().push((event.kind(), len));
            });
        }

        map.set_layer_data("cases", squares(&[Some(1), Some(2)]))
            .unwrap();
        assert!(seen.borrow().is_empty());
        map.dispatch_events();
        assert_eq!(
            *seen.borrow(),
            vec![
                (EventKind::SourceDataLoading, 2),
                (EventKind::SourceData, 2)
            ]
        );
    }

    #[test]
    fn set_layer_data_on_missing_layer_fails() {
        let mut map = map();
        assert!(map.set_layer_data("cases", squares(&[Some(1)])).is_err());
        assert!(map.events.is_empty());
    }

    #[test]
    fn load_is_emitted_once() {
        let mut map = map();
        let count = Rc::new(RefCell::new(0));
        let counter = count.clone();
        map.on(EventKind::Load, move |_, _| *counter.borrow_mut() += 1);

        map.load();
        map.load();
        map.dispatch_events();
        assert!(map.is_loaded());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn zoom_by_stays_in_range() {
        let mut map = map();
        let view = Vec2::new(800.0, 600.0);

        map.zoom = MAX_ZOOM - 1;
        assert!(map.zoom_by(1, view));
        assert!(!map.zoom_by(1, view));
        assert_eq!(map.zoom, MAX_ZOOM);

        // At zoom 2 the world is 1024 pixels wide; zoom 1 would not fill the view.
        map.zoom = 2;
        assert!(!map.zoom_by(-1, view));
        assert_eq!(map.zoom, 2);
        assert!(map.zoom_by(-1, Vec2::new(400.0, 300.0)));
        assert_eq!(map.zoom, 1);
    }

    fn manila_popup() -> Popup {
        Popup {
            anchor: GeoPos {
                lon: 121.0,
                lat: 14.6,
            },
            content: PopupContent {
                name: "Metro Manila".to_string(),
                count: Some(1200),
                group_separator: ',',
            },
        }
    }

    #[test]
    fn click_outside_regions_closes_popup() {
        let mut map = map();
        map.open_popup(manila_popup());
        map.close_popup_unless_feature_clicked();
        assert!(map.popup().is_none());
    }

    #[test]
    fn click_on_a_region_leaves_popup_to_handlers() {
        let mut map = map();
        map.open_popup(manila_popup());
        map.emit(MapEvent::Click {
            layer_id: "cases".to_string(),
            features: vec![crate::region::FeatureId(0)],
            pos: GeoPos::default(),
        });
        map.close_popup_unless_feature_clicked();
        assert_eq!(map.popup(), Some(&manila_popup()));
    }

    #[test]
    fn popup_open_and_close() {
        let mut map = map();
        let popup = Popup {
            anchor: GeoPos {
                lon: 121.0,
                lat: 14.6,
            },
            content: PopupContent {
                name: "Metro Manila".to_string(),
                count: Some(1200),
                group_separator: ',',
            },
        };
        map.open_popup(popup.clone());
        assert_eq!(map.popup(), Some(&popup));
        map.close_popup();
        assert!(map.popup().is_none());
    }
}
