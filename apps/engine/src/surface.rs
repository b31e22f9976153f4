use crate::domain::{Feature, LatLng, Style};
use crate::pipeline::HeatLayer;
use crate::state::{FeatureKey, Popup};

/// The drawing surface the widget drives: tile map, marker clusters, heat
/// layer and popups. The engine decides what goes where; implementations
/// decide how it is painted.
pub trait Surface {
    /// Creates the drawable for a newly stored feature. Temporary features are
    /// expected to go straight onto the map.
    fn register(&mut self, key: FeatureKey, feature: &Feature);

    /// Destroys the drawable of a retired feature
    fn remove(&mut self, key: FeatureKey);

    /// Takes a feature off the map without destroying it
    fn hide(&mut self, key: FeatureKey);

    fn restyle(&mut self, key: FeatureKey, style: &Style);

    /// Replaces the cluster group's membership and attaches it to the map
    fn show_clusters(&mut self, members: &[FeatureKey]);

    fn show_heatmap(&mut self, layer: &HeatLayer);

    fn move_feature(&mut self, key: FeatureKey, to: LatLng);

    fn open_popup(&mut self, popup: &Popup);

    fn close_popup(&mut self);

    /// Limits how far the user can zoom; sent once before the first view
    fn set_zoom_range(&mut self, min: u8, max: u8);

    fn set_view(&mut self, center: LatLng, zoom: u8);
}
