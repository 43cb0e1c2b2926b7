//! Layers for the map view that can handle input, and draw on top of the basemap.
//!
use egui::{Painter, Response};
use std::any::Any;

use crate::EventQueue;
use crate::projection::MapProjection;

/// Choropleth layer
pub mod choropleth;

/// A trait for map layers.
pub trait Layer: Any {
    /// Handles user input for the layer. Events the input gives rise to are pushed onto
    /// `events`. Returns `true` if the input was handled and should not be processed further by
    /// the map.
    fn handle_input(
        &mut self,
        layer_id: &str,
        response: &Response,
        projection: &MapProjection,
        events: &mut EventQueue,
    ) -> bool;

    /// Draws the layer.
    fn draw(&self, painter: &Painter, projection: &MapProjection);

    /// Gets the layer as a `dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Gets the layer as a mutable `dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
