#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release
#![allow(rustdoc::missing_crate_level_docs)] // it's an example

use eframe::egui;
use egui_choropleth::{
    config::{ChoroplethConfig, OpenStreetMapConfig},
    controller::ChoroplethMap,
    projection::GeoPos,
    region::{FeatureId, RegionCollection, RegionFeature, RegionPolygon},
    source::{HttpRegionSource, StaticRegionSource},
    status::HealthStatus,
};

fn main() -> eframe::Result {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1000.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Choropleth",
        options,
        Box::new(|_cc| Ok(Box::<MyApp>::default())),
    )
}

struct MyApp {
    map: ChoroplethMap,
}

impl Default for MyApp {
    fn default() -> Self {
        let config = ChoroplethConfig::default();

        // Real data when both endpoints are given, generated data otherwise.
        let map = match (
            std::env::var("CHOROPLETH_BASEMAP_URL"),
            std::env::var("CHOROPLETH_COUNTS_URL"),
        ) {
            (Ok(basemap_url), Ok(counts_url)) => {
                let source =
                    HttpRegionSource::new(basemap_url, counts_url, config.name_property.clone());
                ChoroplethMap::new(OpenStreetMapConfig::default(), config, source)
            }
            _ => ChoroplethMap::new(OpenStreetMapConfig::default(), config, generated_source()),
        };

        Self { map }
    }
}

/// A grid of cells over the Philippines with made-up counts per status.
fn generated_source() -> StaticRegionSource {
    let mut source = StaticRegionSource::new();
    for (s, status) in HealthStatus::ALL.into_iter().enumerate() {
        let mut seed = 17 + s as u64;
        let features = (0..6)
            .flat_map(|row| (0..4).map(move |col| (row, col)))
            .map(|(row, col)| {
                seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                let lon = 118.0 + col as f64 * 2.0;
                let lat = 6.0 + row as f64 * 2.5;
                RegionFeature {
                    id: FeatureId(0),
                    name: format!("Cell {}-{}", row, col),
                    count: Some((seed >> 33) % (2_000 / (s as u64 + 1))),
                    polygons: vec![RegionPolygon {
                        exterior: vec![
                            GeoPos { lon, lat },
                            GeoPos { lon: lon + 1.8, lat },
                            GeoPos {
                                lon: lon + 1.8,
                                lat: lat + 2.3,
                            },
                            GeoPos { lon, lat: lat + 2.3 },
                        ],
                        holes: vec![],
                    }],
                }
            })
            .collect();
        source.insert(status, RegionCollection::new(features));
    }
    source
}

impl eframe::App for MyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                ui.add(&mut self.map);
            });

        egui::Window::new("Filter")
            .resizable(false)
            .default_width(200.0)
            .show(ctx, |ui| {
                let mut status = self.map.filter();
                let mut picked = false;
                egui::ComboBox::from_label("Health status")
                    .selected_text(status.label())
                    .show_ui(ui, |ui| {
                        for option in HealthStatus::ALL {
                            picked |= ui
                                .selectable_value(&mut status, option, option.label())
                                .clicked();
                        }
                    });
                // Picking the shown status again retries it if it failed.
                if picked {
                    self.map.set_filter(status);
                }

                ui.separator();
                if self.map.has_failed() {
                    ui.horizontal(|ui| {
                        ui.colored_label(egui::Color32::RED, "Unable to load data.");
                        if ui.button("Retry").clicked() {
                            self.map.retry();
                        }
                    });
                }
                if self.map.is_loading() {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Loading...");
                    });
                } else {
                    ui.add(&self.map.legend());
                }

                if let Some(pos) = self.map.map().mouse_pos {
                    ui.separator();
                    ui.label(format!("{:.4}, {:.4}", pos.lat, pos.lon));
                }
            });
    }
}
