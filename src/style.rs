//! Turns color bins into the fill color of the choropleth layer and into legend entries.

use egui::{Color32, Response, Sense, Ui, Widget, vec2};

use crate::Map;
use crate::MapError;
use crate::classify::ColorBin;

/// The fill color of a choropleth layer.
#[derive(Clone, Debug, PartialEq)]
pub enum FillColor {
    /// Every region gets the same color.
    Constant(Color32),

    /// Piecewise-linear interpolation keyed on the region count. Stops are ordered by value.
    Interpolate {
        /// `(count, color)` stops.
        stops: Vec<(f64, Color32)>,
    },
}

impl FillColor {
    /// Builds an interpolation with one stop per bin. `None` if there are no bins.
    pub fn from_bins(bins: &[ColorBin]) -> Option<Self> {
        if bins.is_empty() {
            return None;
        }
        Some(FillColor::Interpolate {
            stops: bins.iter().map(|b| (b.threshold, b.color)).collect(),
        })
    }

    /// Evaluates the color for a region count. Returns `None` when the expression depends on the
    /// count and the region has none.
    pub fn evaluate(&self, count: Option<f64>) -> Option<Color32> {
        match self {
            FillColor::Constant(color) => Some(*color),
            FillColor::Interpolate { stops } => {
                let count = count?;
                let (first, last) = (stops.first()?, stops.last()?);
                if count <= first.0 {
                    return Some(first.1);
                }
                if count >= last.0 {
                    return Some(last.1);
                }
                stops.windows(2).find_map(|pair| {
                    let ((lo, lo_color), (hi, hi_color)) = (pair[0], pair[1]);
                    (count >= lo && count < hi).then(|| {
                        let t = ((count - lo) / (hi - lo)) as f32;
                        lerp_color(lo_color, hi_color, t)
                    })
                })
            }
        }
    }
}

/// Blends two colors channel by channel.
fn lerp_color(a: Color32, b: Color32, t: f32) -> Color32 {
    let lerp = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    Color32::from_rgba_premultiplied(
        lerp(a.r(), b.r()),
        lerp(a.g(), b.g()),
        lerp(a.b(), b.b()),
        lerp(a.a(), b.a()),
    )
}

/// One row of the legend.
#[derive(Clone, Debug, PartialEq)]
pub struct LegendEntry {
    /// The threshold, written as a plain number.
    pub label: String,
    /// Color of the threshold.
    pub color: Color32,
}

/// The legend of the choropleth, one entry per color bin.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Legend {
    /// Title shown above the entries.
    pub title: String,
    /// Entries from the lowest to the highest threshold.
    pub entries: Vec<LegendEntry>,
}

impl Legend {
    /// Creates a legend entry for every bin, in bin order.
    pub fn from_bins(title: impl Into<String>, bins: &[ColorBin]) -> Self {
        Self {
            title: title.into(),
            entries: bins
                .iter()
                .map(|b| LegendEntry {
                    label: b.threshold.to_string(),
                    color: b.color,
                })
                .collect(),
        }
    }

    /// Whether the legend has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Widget for &Legend {
    fn ui(self, ui: &mut Ui) -> Response {
        ui.vertical(|ui| {
            ui.strong(&self.title);
            for entry in &self.entries {
                ui.horizontal(|ui| {
                    let (rect, _) = ui.allocate_exact_size(vec2(18.0, 12.0), Sense::hover());
                    ui.painter().rect_filled(rect, 2.0, entry.color);
                    ui.label(&entry.label);
                });
            }
        })
        .response
    }
}

/// Installs the bins as the fill color of the layer and returns the matching legend entries.
///
/// Without bins nothing is changed and `None` is returned; the caller keeps whatever it was
/// showing.
pub fn apply_bins(
    map: &mut Map,
    layer_id: &str,
    title: &str,
    bins: &[ColorBin],
) -> Result<Option<Legend>, MapError> {
    let Some(fill_color) = FillColor::from_bins(bins) else {
        return Ok(None);
    };
    map.choropleth_mut(layer_id)?.set_fill_color(fill_color);
    Ok(Some(Legend::from_bins(title, bins)))
}
