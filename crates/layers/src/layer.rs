use std::collections::BTreeMap;

use formats::geojson::FeatureCollection;

/// Name of a map layer the core draws into.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub &'static str);

impl LayerId {
    /// Observed extent for the selected date.
    pub const ICE_EXTENT: LayerId = LayerId("ice-extent");
    /// Model-predicted extent overlay.
    pub const ICE_PREDICTION: LayerId = LayerId("ice-prediction");
    /// Growing prefix of the current route.
    pub const ANIMATED_ROUTE: LayerId = LayerId("animated-route");
    /// Static reference route from the bundled dataset.
    pub const REFERENCE_ROUTE: LayerId = LayerId("hudson-route");

    pub fn name(self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Receives layer payloads from the core.
///
/// The core never patches a layer: every `replace` swaps the whole payload.
pub trait RenderSink {
    fn replace(&mut self, layer: LayerId, payload: &FeatureCollection);

    /// Removing an absent layer is a no-op.
    fn remove(&mut self, layer: LayerId);
}

/// In-memory sink holding the latest payload per layer.
#[derive(Debug, Default)]
pub struct LayerStore {
    layers: BTreeMap<LayerId, FeatureCollection>,
    updates: BTreeMap<LayerId, u64>,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, layer: LayerId) -> Option<&FeatureCollection> {
        self.layers.get(&layer)
    }

    pub fn contains(&self, layer: LayerId) -> bool {
        self.layers.contains_key(&layer)
    }

    /// Number of `replace` calls seen for `layer`, including after removal.
    pub fn update_count(&self, layer: LayerId) -> u64 {
        self.updates.get(&layer).copied().unwrap_or(0)
    }

    pub fn layer_ids(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.layers.keys().copied()
    }
}

impl RenderSink for LayerStore {
    fn replace(&mut self, layer: LayerId, payload: &FeatureCollection) {
        self.layers.insert(layer, payload.clone());
        *self.updates.entry(layer).or_insert(0) += 1;
    }

    fn remove(&mut self, layer: LayerId) {
        self.layers.remove(&layer);
    }
}

#[cfg(test)]
mod tests {
    use super::{LayerId, LayerStore, RenderSink};
    use formats::geojson::FeatureCollection;
    use foundation::geo::Position;

    #[test]
    fn replace_swaps_whole_payload() {
        let mut store = LayerStore::new();
        let line = FeatureCollection::line_string(vec![Position::new(0.0, 0.0)]);
        store.replace(LayerId::ANIMATED_ROUTE, &line);
        store.replace(LayerId::ANIMATED_ROUTE, &FeatureCollection::empty());

        assert_eq!(store.get(LayerId::ANIMATED_ROUTE), Some(&FeatureCollection::empty()));
        assert_eq!(store.update_count(LayerId::ANIMATED_ROUTE), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = LayerStore::new();
        store.replace(LayerId::ICE_EXTENT, &FeatureCollection::empty());
        store.remove(LayerId::ICE_EXTENT);
        store.remove(LayerId::ICE_EXTENT);
        assert!(!store.contains(LayerId::ICE_EXTENT));
        assert_eq!(store.layer_ids().count(), 0);
    }
}
