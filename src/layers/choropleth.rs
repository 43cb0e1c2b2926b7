//! A layer filling regions with a color derived from their case count.
//!
//! # Example
//!
//! ```no_run
//! use eframe::egui;
//! use egui_choropleth::{Map, config::OpenStreetMapConfig, layers::choropleth::ChoroplethLayer};
//! use egui_choropleth::region::RegionCollection;
//!
//! struct MyApp {
//!     map: Map,
//! }
//!
//! impl Default for MyApp {
//!   fn default() -> Self {
//!     let geojson = std::fs::read_to_string("provinces.geojson").unwrap();
//!     let regions = RegionCollection::from_geojson_str(&geojson, "adm2").unwrap();
//!
//!     let mut map = Map::new(OpenStreetMapConfig::default());
//!     map.add_layer("cases", ChoroplethLayer::default());
//!     map.set_layer_data("cases", regions).unwrap();
//!
//!     Self { map }
//!   }
//! }
//!
//! impl eframe::App for MyApp {
//!     fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
//!         egui::CentralPanel::default().show(ctx, |ui| {
//!             ui.add(&mut self.map);
//!         });
//!     }
//! }
//! ```

use egui::{Color32, Mesh, Painter, Pos2, Response, Shape, Stroke};
use log::warn;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::EventQueue;
use crate::config::ChoroplethConfig;
use crate::events::MapEvent;
use crate::layers::Layer;
use crate::projection::{GeoPos, MapProjection};
use crate::region::{FeatureId, RegionCollection, RegionPolygon};
use crate::style::FillColor;

/// Per-feature flags tracked by the layer, separate from the feature data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeatureState {
    /// The feature is highlighted as hovered.
    pub hover: bool,
}

/// A triangulated polygon, in geographical coordinates.
struct FillMesh {
    vertices: Vec<GeoPos>,
    indices: Vec<u32>,
}

/// Layer implementation that draws a region collection as a choropleth.
pub struct ChoroplethLayer {
    data: Arc<RegionCollection>,

    // One entry per feature, in feature order.
    fills: Vec<Vec<FillMesh>>,

    states: HashMap<FeatureId, FeatureState>,

    fill_color: FillColor,

    /// Fill color for regions the fill color does not cover.
    pub base_fill: Color32,

    /// The stroke style for drawing the region outlines.
    pub outline: Stroke,

    /// Fill opacity of every region that is not hovered.
    pub fill_opacity: f32,

    /// Fill opacity of the hovered region.
    pub hover_opacity: f32,

    pointer_over: bool,
    last_pointer: Option<Pos2>,
}

impl Default for ChoroplethLayer {
    fn default() -> Self {
        Self::from_config(&ChoroplethConfig::default())
    }
}

impl ChoroplethLayer {
    /// Creates an empty layer styled after `config`.
    pub fn from_config(config: &ChoroplethConfig) -> Self {
        Self {
            data: Arc::default(),
            fills: Vec::new(),
            states: HashMap::new(),
            fill_color: FillColor::Constant(config.base_fill()),
            base_fill: config.base_fill(),
            outline: Stroke::new(1.0, config.outline()),
            fill_opacity: config.fill_opacity,
            hover_opacity: config.hover_opacity,
            pointer_over: false,
            last_pointer: None,
        }
    }

    /// The regions currently drawn.
    pub fn data(&self) -> &Arc<RegionCollection> {
        &self.data
    }

    /// Replaces the drawn regions. Use [`crate::Map::set_layer_data`] to also notify handlers.
    pub(crate) fn set_data(&mut self, data: Arc<RegionCollection>) {
        self.fills = data
            .features()
            .iter()
            .map(|feature| feature.polygons.iter().filter_map(triangulate).collect())
            .collect();
        let len = data.len() as u64;
        self.states.retain(|id, _| id.0 < len);
        self.data = data;
    }

    /// The current fill color.
    pub fn fill_color(&self) -> &FillColor {
        &self.fill_color
    }

    /// Replaces the fill color.
    pub fn set_fill_color(&mut self, fill_color: FillColor) {
        self.fill_color = fill_color;
    }

    /// The state of a feature. Features without a state have the default one.
    pub fn feature_state(&self, id: FeatureId) -> FeatureState {
        self.states.get(&id).copied().unwrap_or_default()
    }

    /// Sets the state of a feature.
    pub fn set_feature_state(&mut self, id: FeatureId, state: FeatureState) {
        if state == FeatureState::default() {
            self.states.remove(&id);
        } else {
            self.states.insert(id, state);
        }
    }

    /// All features currently flagged as hovered.
    pub fn hovered_features(&self) -> Vec<FeatureId> {
        let mut ids: Vec<FeatureId> = self
            .states
            .iter()
            .filter(|(_, state)| state.hover)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Features containing the position, topmost (last drawn) first.
    pub fn features_at(&self, pos: GeoPos) -> Vec<FeatureId> {
        self.data
            .features()
            .iter()
            .rev()
            .filter(|feature| feature.contains(pos))
            .map(|feature| feature.id)
            .collect()
    }

    /// The color a feature is filled with, before opacity is applied.
    pub fn feature_fill(&self, id: FeatureId) -> Option<Color32> {
        let feature = self.data.get(id)?;
        Some(
            self.fill_color
                .evaluate(feature.count.map(|c| c as f64))
                .unwrap_or(self.base_fill),
        )
    }
}

fn triangulate(polygon: &RegionPolygon) -> Option<FillMesh> {
    let mut vertices = polygon.exterior.clone();
    let mut hole_indices = Vec::with_capacity(polygon.holes.len());
    for hole in &polygon.holes {
        hole_indices.push(vertices.len());
        vertices.extend_from_slice(hole);
    }

    let flat: Vec<f64> = vertices.iter().flat_map(|p| [p.lon, p.lat]).collect();
    match earcutr::earcut(&flat, &hole_indices, 2) {
        Ok(indices) => Some(FillMesh {
            vertices,
            indices: indices.into_iter().map(|i| i as u32).collect(),
        }),
        Err(e) => {
            warn!("Unable to triangulate region polygon: {:?}", e);
            None
        }
    }
}

impl Layer for ChoroplethLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(
        &mut self,
        layer_id: &str,
        response: &Response,
        projection: &MapProjection,
        events: &mut EventQueue,
    ) -> bool {
        let hover_pos = response.hover_pos().filter(|_| response.hovered());
        let moved = hover_pos != self.last_pointer;
        self.last_pointer = hover_pos;

        if moved {
            let under_pointer = hover_pos
                .map(|p| {
                    let pos = projection.unproject(p);
                    (pos, self.features_at(pos))
                })
                .filter(|(_, features)| !features.is_empty());

            match under_pointer {
                Some((pos, features)) => {
                    if !self.pointer_over {
                        self.pointer_over = true;
                        events.push_back(MapEvent::MouseEnter {
                            layer_id: layer_id.to_string(),
                        });
                    }
                    events.push_back(MapEvent::MouseMove {
                        layer_id: layer_id.to_string(),
                        features,
                        pos,
                    });
                }
                None if self.pointer_over => {
                    self.pointer_over = false;
                    events.push_back(MapEvent::MouseLeave {
                        layer_id: layer_id.to_string(),
                    });
                }
                None => {}
            }
        }

        if response.clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                let pos = projection.unproject(pointer_pos);
                let features = self.features_at(pos);
                if !features.is_empty() {
                    events.push_back(MapEvent::Click {
                        layer_id: layer_id.to_string(),
                        features,
                        pos,
                    });
                }
            }
        }

        // The map keeps panning and zooming over the regions.
        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        for (feature, fills) in self.data.features().iter().zip(&self.fills) {
            let opacity = if self.feature_state(feature.id).hover {
                self.hover_opacity
            } else {
                self.fill_opacity
            };
            let fill = self
                .feature_fill(feature.id)
                .unwrap_or(self.base_fill)
                .gamma_multiply(opacity);

            for fill_mesh in fills {
                let mut mesh = Mesh::default();
                mesh.vertices = fill_mesh
                    .vertices
                    .iter()
                    .map(|p| egui::epaint::Vertex {
                        pos: projection.project(*p),
                        uv: Default::default(),
                        color: fill,
                    })
                    .collect();
                mesh.indices = fill_mesh.indices.clone();
                painter.add(Shape::Mesh(mesh.into()));
            }

            for polygon in &feature.polygons {
                for ring in std::iter::once(&polygon.exterior).chain(&polygon.holes) {
                    let points: Vec<Pos2> = ring.iter().map(|p| projection.project(*p)).collect();
                    painter.add(Shape::closed_line(points, self.outline));
                }
            }
        }
    }
}
