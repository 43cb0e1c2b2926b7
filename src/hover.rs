//! Hover highlighting and click popups for the choropleth layer.
//!
//! Pointer handlers are registered once, when the map is set up, but the hovered feature changes
//! with every pointer move. The handlers therefore share a single cell holding the hovered id
//! instead of capturing its value at registration time.

use egui::CursorIcon;
use log::error;
use std::cell::Cell;
use std::rc::Rc;

use crate::Map;
use crate::events::{EventKind, MapEvent};
use crate::layers::choropleth::FeatureState;
use crate::projection::GeoPos;
use crate::region::FeatureId;

/// Keeps exactly one feature of a layer flagged as hovered.
///
/// Clones share the same hovered id.
#[derive(Clone, Debug, Default)]
pub struct HoverTracker {
    current: Rc<Cell<Option<FeatureId>>>,
}

impl HoverTracker {
    /// Creates a tracker with nothing hovered.
    pub fn new() -> Self {
        Self::default()
    }

    /// The feature currently hovered.
    pub fn current(&self) -> Option<FeatureId> {
        self.current.get()
    }

    /// The pointer moved over `features` (topmost first). The previously hovered feature is
    /// cleared before the topmost one is flagged.
    pub fn on_move(&self, map: &mut Map, layer_id: &str, features: &[FeatureId]) {
        let Some(&entered) = features.first() else {
            return;
        };
        if let Some(previous) = self.current.get() {
            if previous != entered {
                set_hover(map, layer_id, previous, false);
            }
        }
        set_hover(map, layer_id, entered, true);
        self.current.set(Some(entered));
    }

    /// The pointer entered the layer.
    pub fn on_enter(&self, map: &mut Map) {
        map.set_cursor(Some(CursorIcon::PointingHand));
    }

    /// The pointer left the layer: nothing is hovered anymore.
    pub fn on_leave(&self, map: &mut Map, layer_id: &str) {
        map.set_cursor(None);
        if let Some(previous) = self.current.take() {
            set_hover(map, layer_id, previous, false);
        }
    }

    /// Registers the pointer handlers of the layer on the map.
    pub fn register(&self, map: &mut Map, layer_id: &str) {
        let tracker = self.clone();
        map.on_layer(EventKind::MouseMove, layer_id, move |map, event| {
            if let MapEvent::MouseMove {
                layer_id, features, ..
            } = event
            {
                tracker.on_move(map, layer_id, features);
            }
        });

        let tracker = self.clone();
        map.on_layer(EventKind::MouseEnter, layer_id, move |map, _| {
            tracker.on_enter(map);
        });

        let tracker = self.clone();
        map.on_layer(EventKind::MouseLeave, layer_id, move |map, event| {
            if let Some(layer_id) = event.layer_id() {
                tracker.on_leave(map, layer_id);
            }
        });
    }
}

fn set_hover(map: &mut Map, layer_id: &str, id: FeatureId, hover: bool) {
    match map.choropleth_mut(layer_id) {
        Ok(layer) => layer.set_feature_state(id, FeatureState { hover }),
        Err(e) => error!("Unable to update hover state of {:?}: {}", id, e),
    }
}

/// What the popup of a clicked region shows.
#[derive(Clone, Debug, PartialEq)]
pub struct PopupContent {
    /// Name of the region.
    pub name: String,
    /// Number of cases, if known.
    pub count: Option<u64>,
    /// Thousands separator for the count.
    pub group_separator: char,
}

impl PopupContent {
    /// The count with thousands separators, `-` if unknown.
    pub fn formatted_count(&self) -> String {
        match self.count {
            Some(count) => format_count(count, self.group_separator),
            None => "-".to_string(),
        }
    }

    /// The popup as a small HTML fragment, for embedders that show it outside of egui (a web
    /// view, a report). The map itself draws the popup with egui widgets.
    pub fn to_html(&self) -> String {
        format!(
            concat!(
                r#"<div class="popup">"#,
                r#"<div class="popup-title">{}</div>"#,
                r#"<div class="popup-row"><span class="popup-label">Count:</span> "#,
                r#"<span class="popup-value">{}</span></div>"#,
                "</div>"
            ),
            escape_html(&self.name),
            escape_html(&self.formatted_count())
        )
    }
}

/// A popup anchored at a geographical position.
#[derive(Clone, Debug, PartialEq)]
pub struct Popup {
    /// Where the popup points to.
    pub anchor: GeoPos,
    /// What it shows.
    pub content: PopupContent,
}

/// Registers a click handler opening a popup for the clicked region. Hover state is not touched.
pub fn register_click_popup(map: &mut Map, layer_id: &str, group_separator: char) {
    map.on_layer(EventKind::Click, layer_id, move |map, event| {
        let MapEvent::Click {
            layer_id,
            features,
            pos,
        } = event
        else {
            return;
        };
        let Some(&clicked) = features.first() else {
            return;
        };
        let content = match map.choropleth(layer_id) {
            Ok(layer) => layer.data().get(clicked).map(|feature| PopupContent {
                name: feature.name.clone(),
                count: feature.count,
                group_separator,
            }),
            Err(e) => {
                error!("Unable to open popup for {:?}: {}", clicked, e);
                None
            }
        };
        if let Some(content) = content {
            map.open_popup(Popup {
                anchor: *pos,
                content,
            });
        }
    });
}

/// Formats a count with a separator between groups of three digits.
pub fn format_count(count: u64, separator: char) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(digit);
    }
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DynMapConfig;
    use crate::layers::choropleth::ChoroplethLayer;
    use crate::region::tests::squares;

    const LAYER: &str = "cases";

    fn map_with_regions(n: usize) -> Map {
        let mut map = Map::new(DynMapConfig::new(|_| String::new()));
        map.add_layer(LAYER, ChoroplethLayer::default());
        let counts: Vec<_> = (0..n as u64).map(|c| Some(c * 1000)).collect();
        map.set_layer_data(LAYER, squares(&counts)).unwrap();
        map.dispatch_events();
        map
    }

    fn hovered(map: &Map) -> Vec<FeatureId> {
        map.layer::<ChoroplethLayer>(LAYER)
            .unwrap()
            .hovered_features()
    }

    fn pointer_move(map: &mut Map, id: u64) {
        map.emit(MapEvent::MouseMove {
            layer_id: LAYER.to_string(),
            features: vec![FeatureId(id)],
            pos: GeoPos::default(),
        });
        map.dispatch_events();
    }

    fn pointer_leave(map: &mut Map) {
        map.emit(MapEvent::MouseLeave {
            layer_id: LAYER.to_string(),
        });
        map.dispatch_events();
    }

    #[test]
    fn move_sets_and_moves_the_highlight() {
        let mut map = map_with_regions(3);
        let tracker = HoverTracker::new();
        tracker.register(&mut map, LAYER);

        pointer_move(&mut map, 1);
        assert_eq!(tracker.current(), Some(FeatureId(1)));
        assert_eq!(hovered(&map), vec![FeatureId(1)]);

        pointer_move(&mut map, 2);
        assert_eq!(tracker.current(), Some(FeatureId(2)));
        assert_eq!(hovered(&map), vec![FeatureId(2)]);

        pointer_move(&mut map, 2);
        assert_eq!(hovered(&map), vec![FeatureId(2)]);
    }

    #[test]
    fn leave_clears_the_highlight_including_feature_zero() {
        let mut map = map_with_regions(2);
        let tracker = HoverTracker::new();
        tracker.register(&mut map, LAYER);

        map.emit(MapEvent::MouseEnter {
            layer_id: LAYER.to_string(),
        });
        pointer_move(&mut map, 0);
        assert_eq!(map.cursor(), Some(CursorIcon::PointingHand));
        assert_eq!(hovered(&map), vec![FeatureId(0)]);

        pointer_leave(&mut map);
        assert_eq!(tracker.current(), None);
        assert!(hovered(&map).is_empty());
        assert_eq!(map.cursor(), None);
    }

    #[test]
    fn move_without_features_changes_nothing() {
        let mut map = map_with_regions(2);
        let tracker = HoverTracker::new();
        tracker.on_move(&mut map, LAYER, &[FeatureId(1)]);
        tracker.on_move(&mut map, LAYER, &[]);
        assert_eq!(tracker.current(), Some(FeatureId(1)));
        assert_eq!(hovered(&map), vec![FeatureId(1)]);
    }

    #[test]
    fn at_most_one_feature_is_hovered() {
        let mut map = map_with_regions(6);
        let tracker = HoverTracker::new();
        tracker.register(&mut map, LAYER);

        let mut state: u64 = 7;
        for _ in 0..300 {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let roll = (state >> 33) % 8;
            if roll >= 6 {
                pointer_leave(&mut map);
            } else {
                pointer_move(&mut map, roll);
            }

            let marked = hovered(&map);
            assert!(marked.len() <= 1);
            assert_eq!(marked.first().copied(), tracker.current());
        }
    }

    #[test]
    fn clones_share_the_hovered_id() {
        let mut map = map_with_regions(2);
        let tracker = HoverTracker::new();
        let handle = tracker.clone();
        handle.on_move(&mut map, LAYER, &[FeatureId(1)]);
        assert_eq!(tracker.current(), Some(FeatureId(1)));
    }

    #[test]
    fn click_opens_popup_without_touching_hover() {
        let mut map = map_with_regions(3);
        let tracker = HoverTracker::new();
        tracker.register(&mut map, LAYER);
        register_click_popup(&mut map, LAYER, ',');

        pointer_move(&mut map, 0);
        map.emit(MapEvent::Click {
            layer_id: LAYER.to_string(),
            features: vec![FeatureId(2)],
            pos: GeoPos { lon: 4.5, lat: 0.5 },
        });
        map.dispatch_events();

        let popup = map.popup().unwrap();
        assert_eq!(popup.anchor, GeoPos { lon: 4.5, lat: 0.5 });
        assert_eq!(popup.content.name, "Region 2");
        assert_eq!(popup.content.formatted_count(), "2,000");
        assert_eq!(tracker.current(), Some(FeatureId(0)));
        assert_eq!(hovered(&map), vec![FeatureId(0)]);
    }

    #[test]
    fn count_formatting() {
        assert_eq!(format_count(0, ','), "0");
        assert_eq!(format_count(999, ','), "999");
        assert_eq!(format_count(1000, ','), "1,000");
        assert_eq!(format_count(1234567, ','), "1,234,567");
        assert_eq!(format_count(123456, '.'), "123.456");
    }

    #[test]
    fn popup_html_is_escaped() {
        let content = PopupContent {
            name: "Cotabato <North>".to_string(),
            count: Some(12345),
            group_separator: ',',
        };
        let html = content.to_html();
        assert!(html.contains("Cotabato &lt;North&gt;"));
        assert!(html.contains(">12,345<"));

        let unknown = PopupContent {
            count: None,
            ..content
        };
        assert_eq!(unknown.formatted_count(), "-");
    }
}
