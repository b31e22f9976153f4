// Bindings to the `window.mapWidgetSurface` object the page script installs
// around Leaflet. Feature keys cross the boundary as plain numbers.

use map_widget_engine::state::FeatureKey;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = registerFeature)]
    pub fn register_feature(key: f64, feature: &JsValue);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = removeFeature)]
    pub fn remove_feature(key: f64);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = hideFeature)]
    pub fn hide_feature(key: f64);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = restyleFeature)]
    pub fn restyle_feature(key: f64, style: &JsValue);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = showClusters)]
    pub fn show_clusters(keys: &JsValue, options: &JsValue);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = showHeatmap)]
    pub fn show_heatmap(layer: &JsValue);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = moveFeature)]
    pub fn move_feature(key: f64, to: &JsValue);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = openPopup)]
    pub fn open_popup(popup: &JsValue);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = closePopup)]
    pub fn close_popup();

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = setZoomRange)]
    pub fn set_zoom_range(min: u8, max: u8);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = setView)]
    pub fn set_view(center: &JsValue, zoom: u8);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = onCanvasClick)]
    pub fn on_canvas_click(handler: &Closure<dyn FnMut(JsValue) -> bool>);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = onCanvasDoubleClick)]
    pub fn on_canvas_double_click(handler: &Closure<dyn FnMut()>);

    /// The handler returns true when the click must not reach the canvas
    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = onFeatureClick)]
    pub fn on_feature_click(handler: &Closure<dyn FnMut(f64, JsValue) -> bool>);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = onFeatureHover)]
    pub fn on_feature_hover(handler: &Closure<dyn FnMut(f64, bool)>);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = onFeatureDrag)]
    pub fn on_feature_drag(handler: &Closure<dyn FnMut(f64, JsValue)>);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = onFeatureDragEnd)]
    pub fn on_feature_drag_end(handler: &Closure<dyn FnMut(f64)>);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = onPopupAction)]
    pub fn on_popup_action(handler: &Closure<dyn FnMut(JsValue)>);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = onFilterChange)]
    pub fn on_filter_change(handler: &Closure<dyn FnMut(JsValue)>);

    #[wasm_bindgen(js_namespace = mapWidgetSurface, js_name = onSetCenter)]
    pub fn on_set_center(handler: &Closure<dyn FnMut(JsValue)>);
}

#[allow(clippy::cast_precision_loss)]
pub fn key_to_js(key: FeatureKey) -> f64 {
    key.get() as f64
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn key_from_js(raw: f64) -> Option<FeatureKey> {
    (raw.is_finite() && raw >= 0.0 && raw.fract() == 0.0).then(|| FeatureKey::from_raw(raw as u64))
}
