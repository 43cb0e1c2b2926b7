//! Wires the map, the choropleth layer, hover tracking and data refreshes together.
//!
//! A [`ChoroplethMap`] creates its [`Map`] once and registers every event handler right away.
//! The handlers share the legend, the loading flag and the hovered feature with the controller
//! through reference-counted cells, so they always see the current values.

use egui::{Response, Ui, Widget};
use log::{debug, error};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::Map;
use crate::classify::classify;
use crate::config::{ChoroplethConfig, MapConfig};
use crate::events::EventKind;
use crate::hover::{HoverTracker, register_click_popup};
use crate::layers::choropleth::ChoroplethLayer;
use crate::refresh::{RefreshOutcome, RefreshPipeline};
use crate::region::FeatureId;
use crate::source::RegionSource;
use crate::status::HealthStatus;
use crate::style::{Legend, apply_bins};

/// A choropleth of case counts that follows a health-status filter.
pub struct ChoroplethMap {
    map: Map,
    config: ChoroplethConfig,
    pipeline: RefreshPipeline,
    filter: HealthStatus,
    legend: Rc<RefCell<Legend>>,
    loading: Rc<Cell<bool>>,
    failed: bool,
    hover: HoverTracker,
}

impl ChoroplethMap {
    /// Creates the map and registers its handlers. Data is first requested once the map has been
    /// shown.
    pub fn new(
        map_config: impl MapConfig + 'static,
        config: ChoroplethConfig,
        source: impl RegionSource + 'static,
    ) -> Self {
        let mut map = Map::new(map_config);
        let layer_id = config.layer_id.clone();
        let legend = Rc::new(RefCell::new(Legend {
            title: config.legend_title.clone(),
            entries: Vec::new(),
        }));
        let loading = Rc::new(Cell::new(false));
        let hover = HoverTracker::new();

        let layer_config = config.clone();
        map.once(EventKind::Load, move |map, _| {
            debug!("Map loaded, adding layer `{}`", layer_config.layer_id);
            map.add_layer(
                layer_config.layer_id.clone(),
                ChoroplethLayer::from_config(&layer_config),
            );
        });

        hover.register(&mut map, &layer_id);
        register_click_popup(&mut map, &layer_id, config.group_separator);

        let palette = config.palette();
        let title = config.legend_title.clone();
        let shown_legend = legend.clone();
        map.on_layer(EventKind::SourceDataLoading, &layer_id, move |map, event| {
            let Some(layer_id) = event.layer_id() else {
                return;
            };
            let samples = match map.choropleth(layer_id) {
                Ok(layer) => layer.data().samples(),
                Err(e) => {
                    error!("Unable to classify regions: {}", e);
                    return;
                }
            };
            let bins = classify(&samples, &palette);
            match apply_bins(map, layer_id, &title, &bins) {
                Ok(Some(new_legend)) => *shown_legend.borrow_mut() = new_legend,
                Ok(None) => debug!(
                    "No color bins for {} samples, keeping the current colors",
                    samples.len()
                ),
                Err(e) => error!("Unable to apply color bins: {}", e),
            }
        });

        let hide_loading = loading.clone();
        map.on_layer(EventKind::SourceData, &layer_id, move |_, _| {
            hide_loading.set(false);
        });

        Self {
            map,
            filter: config.default_status,
            config,
            pipeline: RefreshPipeline::new(source),
            legend,
            loading,
            failed: false,
            hover,
        }
    }

    /// Shows the regions of another health status. Setting the current filter again does
    /// nothing once its data has been requested, unless that request failed.
    pub fn set_filter(&mut self, status: HealthStatus) {
        if status == self.filter && self.pipeline.latest() > 0 && !self.failed {
            return;
        }
        self.filter = status;
        if self.map.has_layer(&self.config.layer_id) {
            self.refresh();
        }
    }

    /// The health status shown.
    pub fn filter(&self) -> HealthStatus {
        self.filter
    }

    /// Whether the latest request failed. Cleared by the next request.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Requests the current filter again.
    pub fn retry(&mut self) {
        if self.map.has_layer(&self.config.layer_id) {
            self.refresh();
        }
    }

    fn refresh(&mut self) {
        self.failed = false;
        self.loading.set(true);
        let previous = self
            .map
            .choropleth(&self.config.layer_id)
            .ok()
            .map(|layer| layer.data().clone())
            .filter(|data| !data.is_empty());
        self.pipeline.request(self.filter, previous);
    }

    /// Runs pending handlers, issues the first request once the map is loaded and applies the
    /// requests that finished. Returns whether any request finished.
    ///
    /// The widget calls this every frame.
    pub fn update(&mut self) -> bool {
        self.map.dispatch_events();
        if self.pipeline.latest() == 0 && self.map.has_layer(&self.config.layer_id) {
            self.refresh();
        }

        let outcomes = self.pipeline.poll();
        let finished = !outcomes.is_empty();
        for outcome in outcomes {
            match outcome {
                RefreshOutcome::Applied { status, data, .. } => {
                    debug!("Showing {} `{}` regions", data.len(), status);
                    if let Err(e) = self.map.set_layer_data(&self.config.layer_id, data) {
                        error!("Unable to show `{}` regions: {}", status, e);
                        self.failed = true;
                        self.loading.set(false);
                    }
                }
                RefreshOutcome::Failed { status, error, .. } => {
                    error!("Unable to load `{}` regions: {:?}", status, error);
                    self.failed = true;
                    self.loading.set(false);
                }
                RefreshOutcome::Discarded { .. } => {}
            }
        }

        self.map.dispatch_events();
        finished
    }

    /// The legend of the current colors.
    pub fn legend(&self) -> Legend {
        self.legend.borrow().clone()
    }

    /// Whether new data is being loaded.
    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    /// The region under the pointer.
    pub fn hovered(&self) -> Option<FeatureId> {
        self.hover.current()
    }

    /// The configuration the map was created with.
    pub fn config(&self) -> &ChoroplethConfig {
        &self.config
    }

    /// The underlying map.
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// The underlying map, mutably.
    pub fn map_mut(&mut self) -> &mut Map {
        &mut self.map
    }
}

impl Widget for &mut ChoroplethMap {
    fn ui(self, ui: &mut Ui) -> Response {
        let response = ui.add(&mut self.map);
        if self.update() || self.pipeline.is_pending() {
            ui.ctx().request_repaint();
        }
        response
    }
}
