//! Events emitted by the map and the handlers reacting to them.
//!
//! Layers and data updates push [`MapEvent`]s onto the map's queue. Handlers are registered once,
//! usually right after the map is created, and are run for every matching event when the map
//! dispatches its queue (once per frame, or explicitly through [`Map::dispatch_events`]).

use crate::Map;
use crate::projection::GeoPos;
use crate::region::FeatureId;

/// Something that happened on the map.
#[derive(Clone, Debug, PartialEq)]
pub enum MapEvent {
    /// The map has been shown for the first time.
    Load,

    /// New data has been put into a layer and is about to be drawn.
    SourceDataLoading {
        /// The layer whose data changed.
        layer_id: String,
    },

    /// New data of a layer is in place.
    SourceData {
        /// The layer whose data changed.
        layer_id: String,
    },

    /// The pointer entered the features of a layer.
    MouseEnter {
        /// The layer under the pointer.
        layer_id: String,
    },

    /// The pointer moved over features of a layer.
    MouseMove {
        /// The layer under the pointer.
        layer_id: String,
        /// Features under the pointer, topmost first. Never empty.
        features: Vec<FeatureId>,
        /// Geographical position of the pointer.
        pos: GeoPos,
    },

    /// The pointer left the features of a layer.
    MouseLeave {
        /// The layer the pointer left.
        layer_id: String,
    },

    /// A feature of a layer was clicked.
    Click {
        /// The clicked layer.
        layer_id: String,
        /// Features under the pointer, topmost first. Never empty.
        features: Vec<FeatureId>,
        /// Geographical position of the click.
        pos: GeoPos,
    },
}

/// The kind of a [`MapEvent`], used to register handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`MapEvent::Load`].
    Load,
    /// See [`MapEvent::SourceDataLoading`].
    SourceDataLoading,
    /// See [`MapEvent::SourceData`].
    SourceData,
    /// See [`MapEvent::MouseEnter`].
    MouseEnter,
    /// See [`MapEvent::MouseMove`].
    MouseMove,
    /// See [`MapEvent::MouseLeave`].
    MouseLeave,
    /// See [`MapEvent::Click`].
    Click,
}

impl MapEvent {
    /// The kind of the event.
    pub fn kind(&self) -> EventKind {
        match self {
            MapEvent::Load => EventKind::Load,
            MapEvent::SourceDataLoading { .. } => EventKind::SourceDataLoading,
            MapEvent::SourceData { .. } => EventKind::SourceData,
            MapEvent::MouseEnter { .. } => EventKind::MouseEnter,
            MapEvent::MouseMove { .. } => EventKind::MouseMove,
            MapEvent::MouseLeave { .. } => EventKind::MouseLeave,
            MapEvent::Click { .. } => EventKind::Click,
        }
    }

    /// The layer the event concerns, if any.
    pub fn layer_id(&self) -> Option<&str> {
        match self {
            MapEvent::Load => None,
            MapEvent::SourceDataLoading { layer_id }
            | MapEvent::SourceData { layer_id }
            | MapEvent::MouseEnter { layer_id }
            | MapEvent::MouseMove { layer_id, .. }
            | MapEvent::MouseLeave { layer_id }
            | MapEvent::Click { layer_id, .. } => Some(layer_id),
        }
    }
}

/// A function reacting to map events. It gets mutable access to the map that emitted the event.
pub type EventHandler = Box<dyn FnMut(&mut Map, &MapEvent)>;

pub(crate) struct Registration {
    kind: EventKind,
    layer_id: Option<String>,
    once: bool,
    handler: EventHandler,
}

impl Registration {
    pub(crate) fn new(
        kind: EventKind,
        layer_id: Option<String>,
        once: bool,
        handler: EventHandler,
    ) -> Self {
        Self {
            kind,
            layer_id,
            once,
            handler,
        }
    }

    fn matches(&self, event: &MapEvent) -> bool {
        self.kind == event.kind()
            && match &self.layer_id {
                Some(id) => event.layer_id() == Some(id.as_str()),
                None => true,
            }
    }

    /// Runs the handler if the event matches. Returns whether the registration should be kept.
    pub(crate) fn handle(&mut self, map: &mut Map, event: &MapEvent) -> bool {
        if !self.matches(event) {
            return true;
        }
        (self.handler)(map, event);
        !self.once
    }
}
