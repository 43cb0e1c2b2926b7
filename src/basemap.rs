//! The raster tiles drawn underneath the layers.

use eframe::egui;
use egui::{Color32, Painter, Rect, Sense, Ui, Vec2, pos2};
use eyre::Context;
use log::{debug, error};
use poll_promise::Promise;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::MapConfig;
use crate::projection::GeoPos;
use crate::{CLIENT, MapError, TILE_SIZE, TileId, lat_to_y, lon_to_x};

/// The state of a tile in the cache.
enum Tile {
    /// The tile is being downloaded.
    Loading(Promise<Result<egui::ColorImage, Arc<eyre::Report>>>),

    /// The tile is in memory.
    Loaded(egui::TextureHandle),

    /// The tile failed to download.
    Failed(Arc<eyre::Report>),
}

/// Downloads, caches and draws the tiles of a tile server.
pub(crate) struct Basemap {
    tiles: HashMap<TileId, Tile>,
    config: Box<dyn MapConfig>,
}

impl Basemap {
    pub(crate) fn new(config: Box<dyn MapConfig>) -> Self {
        Self {
            tiles: HashMap::new(),
            config,
        }
    }

    /// Number of tiles in the cache, in any state.
    #[cfg(test)]
    pub(crate) fn cached(&self) -> usize {
        self.tiles.len()
    }

    /// Draws every tile visible in `rect`, starting downloads for the ones not cached yet.
    pub(crate) fn draw(
        &mut self,
        ui: &mut Ui,
        painter: &Painter,
        rect: Rect,
        center: GeoPos,
        zoom: u8,
    ) {
        painter.rect_filled(rect, 0.0, Color32::from_rgb(220, 220, 220)); // Background

        let visible_tiles: Vec<_> = visible_tiles(center, zoom, rect).collect();
        for (tile_id, tile_pos) in visible_tiles {
            self.draw_tile(ui, painter, tile_id, tile_pos);
        }
    }

    fn draw_tile(&mut self, ui: &mut Ui, painter: &Painter, tile_id: TileId, tile_pos: egui::Pos2) {
        let config = self.config.as_ref();
        let tile_state = self
            .tiles
            .entry(tile_id)
            .or_insert_with(|| Tile::Loading(download_tile(tile_id.to_url(config))));

        // Check the promise before matching on the state, so a tile that just finished loading
        // is drawn right away.
        if let Tile::Loading(promise) = tile_state {
            if let Some(result) = promise.ready() {
                match result {
                    Ok(color_image) => {
                        let texture = ui.ctx().load_texture(
                            format!("tile_{}_{}_{}", tile_id.z, tile_id.x, tile_id.y),
                            color_image.clone(),
                            Default::default(),
                        );
                        *tile_state = Tile::Loaded(texture);
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        *tile_state = Tile::Failed(e.clone());
                    }
                }
            }
        }

        let tile_rect =
            Rect::from_min_size(tile_pos, Vec2::new(TILE_SIZE as f32, TILE_SIZE as f32));

        match tile_state {
            Tile::Loading(_) => {
                draw_placeholder(painter, tile_rect, "?", Color32::ORANGE);
                ui.ctx().request_repaint();
            }
            Tile::Loaded(texture) => {
                painter.image(
                    texture.id(),
                    tile_rect,
                    Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
            Tile::Failed(e) => {
                draw_placeholder(painter, tile_rect, "!", Color32::RED);
                let response = ui.interact(tile_rect, ui.id().with(tile_id), Sense::hover());
                response.on_hover_text(format!("{}", e));
            }
        }
    }

    /// Draws the attribution of the tile server in the lower left corner of `rect`.
    pub(crate) fn draw_attribution(&self, ui: &mut Ui, rect: Rect) {
        let Some(attribution) = self.config.attribution() else {
            return;
        };
        let bg_color = if ui.visuals().dark_mode {
            Color32::from_black_alpha(150)
        } else {
            Color32::from_white_alpha(150)
        };

        let frame = egui::Frame::NONE
            .inner_margin(egui::Margin::same(5))
            .fill(bg_color)
            .corner_radius(3.0);

        egui::Area::new(ui.id().with("attribution"))
            .fixed_pos(rect.left_bottom())
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(5.0, -5.0))
            .show(ui.ctx(), |ui| {
                frame.show(ui, |ui| {
                    ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                    ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend);

                    if let Some(url) = self.config.attribution_url() {
                        ui.hyperlink_to(attribution, url);
                    } else {
                        ui.label(attribution);
                    }
                });
            });
    }
}

fn download_tile(url: String) -> Promise<Result<egui::ColorImage, Arc<eyre::Report>>> {
    Promise::spawn_thread("download_tile", move || -> Result<_, Arc<eyre::Report>> {
        let result: Result<_, eyre::Report> = (|| {
            debug!("Downloading tile from {}", &url);
            let response = CLIENT.get(&url).send().map_err(MapError::from)?;

            if !response.status().is_success() {
                return Err(MapError::TileDownloadError(response.status().to_string()));
            }

            let bytes = response.bytes().map_err(MapError::from)?.to_vec();
            let image = image::load_from_memory(&bytes)
                .map_err(MapError::from)?
                .to_rgba8();

            let size = [image.width() as _, image.height() as _];
            let pixels = image.into_raw();
            Ok(egui::ColorImage::from_rgba_unmultiplied(size, &pixels))
        })()
        .with_context(|| format!("Failed to download tile from {}", &url));

        result.map_err(Arc::new)
    })
}

fn draw_placeholder(painter: &Painter, tile_rect: Rect, mark: &str, color: Color32) {
    painter.rect_filled(tile_rect, 0.0, Color32::from_gray(220));
    painter.rect_stroke(
        tile_rect,
        0.0,
        egui::Stroke::new(1.0, Color32::GRAY),
        egui::StrokeKind::Inside,
    );
    painter.text(
        tile_rect.center(),
        egui::Align2::CENTER_CENTER,
        mark,
        egui::FontId::proportional(40.0),
        color,
    );
}

/// The tiles covering `rect` and the screen position of their top left corner.
fn visible_tiles(
    center: GeoPos,
    zoom: u8,
    rect: Rect,
) -> impl Iterator<Item = (TileId, egui::Pos2)> {
    let center_x = lon_to_x(center.lon, zoom);
    let center_y = lat_to_y(center.lat, zoom);

    let widget_center_x = rect.width() / 2.0;
    let widget_center_y = rect.height() / 2.0;

    let x_min = (center_x - widget_center_x as f64 / TILE_SIZE as f64).floor() as i32;
    let y_min = (center_y - widget_center_y as f64 / TILE_SIZE as f64).floor() as i32;
    let x_max = (center_x + widget_center_x as f64 / TILE_SIZE as f64).ceil() as i32;
    let y_max = (center_y + widget_center_y as f64 / TILE_SIZE as f64).ceil() as i32;

    // Tiles outside of the world are skipped.
    let last = 2_i32.pow(zoom as u32) - 1;
    let rect_min = rect.min;
    (x_min.max(0)..=x_max.min(last)).flat_map(move |x| {
        (y_min.max(0)..=y_max.min(last)).map(move |y| {
            let tile_id = TileId {
                z: zoom,
                x: x as u32,
                y: y as u32,
            };
            let screen_x = widget_center_x + (x as f64 - center_x) as f32 * TILE_SIZE as f32;
            let screen_y = widget_center_y + (y as f64 - center_y) as f32 * TILE_SIZE as f32;
            let tile_pos = rect_min + Vec2::new(screen_x, screen_y);
            (tile_id, tile_pos)
        })
    })
}
