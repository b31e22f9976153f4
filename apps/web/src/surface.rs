use map_widget_engine::config::ClusterSettings;
use map_widget_engine::pipeline::HeatLayer;
use map_widget_engine::state::{FeatureKey, Popup};
use map_widget_engine::{Feature, LatLng, Style, Surface};
use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use tracing::warn;
use wasm_bindgen::JsValue;

use crate::bridge::{self, key_to_js};

/// Added to the page body while a popup is open, so the page can hide its
/// map controls
const POPUP_OPEN_CLASS: &str = "leaflet-popup-open";

/// Drives the Leaflet map through the page's `mapWidgetSurface` object
pub struct LeafletSurface {
    clusters: ClusterSettings,
}

impl LeafletSurface {
    pub const fn new(clusters: ClusterSettings) -> Self {
        Self { clusters }
    }
}

/// Plain JS objects and numbers, never `Map`s or `BigInt`s
fn to_js<T: Serialize + ?Sized>(value: &T) -> Option<JsValue> {
    match value.serialize(&Serializer::json_compatible()) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(%error, "could not hand value to the map");
            None
        }
    }
}

fn set_popup_class(open: bool) {
    let Some(body) = web_sys::window()
        .and_then(|window| window.document())
        .and_then(|document| document.body())
    else {
        return;
    };

    let classes = body.class_list();
    let result = if open {
        classes.add_1(POPUP_OPEN_CLASS)
    } else {
        classes.remove_1(POPUP_OPEN_CLASS)
    };
    if let Err(error) = result {
        warn!(?error, "could not toggle popup class");
    }
}

impl Surface for LeafletSurface {
    fn register(&mut self, key: FeatureKey, feature: &Feature) {
        if let Some(feature) = to_js(feature) {
            bridge::register_feature(key_to_js(key), &feature);
        }
    }

    fn remove(&mut self, key: FeatureKey) {
        bridge::remove_feature(key_to_js(key));
    }

    fn hide(&mut self, key: FeatureKey) {
        bridge::hide_feature(key_to_js(key));
    }

    fn restyle(&mut self, key: FeatureKey, style: &Style) {
        if let Some(style) = to_js(style) {
            bridge::restyle_feature(key_to_js(key), &style);
        }
    }

    fn show_clusters(&mut self, members: &[FeatureKey]) {
        if let (Some(keys), Some(options)) = (to_js(members), to_js(&self.clusters)) {
            bridge::show_clusters(&keys, &options);
        }
    }

    fn show_heatmap(&mut self, layer: &HeatLayer) {
        if let Some(layer) = to_js(layer) {
            bridge::show_heatmap(&layer);
        }
    }

    fn move_feature(&mut self, key: FeatureKey, to: LatLng) {
        if let Some(to) = to_js(&to) {
            bridge::move_feature(key_to_js(key), &to);
        }
    }

    fn open_popup(&mut self, popup: &Popup) {
        if let Some(popup) = to_js(popup) {
            bridge::open_popup(&popup);
            set_popup_class(true);
        }
    }

    fn close_popup(&mut self) {
        bridge::close_popup();
        set_popup_class(false);
    }

    fn set_zoom_range(&mut self, min: u8, max: u8) {
        bridge::set_zoom_range(min, max);
    }

    fn set_view(&mut self, center: LatLng, zoom: u8) {
        if let Some(center) = to_js(&center) {
            bridge::set_view(&center, zoom);
        }
    }
}
