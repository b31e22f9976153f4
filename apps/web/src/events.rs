use std::rc::Rc;

use chrono::Local;
use map_widget_engine::host::PopupAction;
use map_widget_engine::input::{ClickEvent, ClickOutcome};
use map_widget_engine::state::{FilterKey, FilterValue};
use map_widget_engine::{FeatureClick, LatLng};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use wasm_bindgen::prelude::*;

use crate::bridge::{self, key_from_js};
use crate::host::{self, now, with_widget, SharedWidget};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CanvasClick {
    lat: f64,
    lng: f64,
    #[serde(default)]
    keyboard_submit: bool,
}

#[derive(Deserialize)]
struct FilterChange {
    key: String,
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
struct CenterRequest {
    lat: f64,
    lng: f64,
    #[serde(default)]
    zoom: Option<u8>,
}

fn decode<T: for<'de> Deserialize<'de>>(value: JsValue, what: &str) -> Option<T> {
    match serde_wasm_bindgen::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(error) => {
            warn!(%error, what, "could not read event payload");
            None
        }
    }
}

/// Registers every map and page callback. The closures live for the whole
/// page, so they are leaked on purpose.
pub fn wire(widget: &SharedWidget) {
    canvas_clicks(widget);
    feature_events(widget);
    popup_actions(widget);
    page_controls(widget);
}

fn canvas_clicks(widget: &SharedWidget) {
    let click = {
        let widget = Rc::clone(widget);
        Closure::<dyn FnMut(JsValue) -> bool>::new(move |payload: JsValue| {
            let Some(click) = decode::<CanvasClick>(payload, "canvas click") else {
                return true;
            };
            let event = ClickEvent {
                at: now(),
                location: LatLng::new(click.lat, click.lng),
                keyboard_submit: click.keyboard_submit,
            };

            match with_widget(&widget, |widget| widget.on_click(&event)) {
                Some(ClickOutcome::Pending(pending)) => {
                    host::schedule_click(&widget, pending);
                    true
                }
                // Enter in a form must not close the popup it belongs to
                Some(ClickOutcome::KeyboardSubmit) => false,
                _ => true,
            }
        })
    };
    bridge::on_canvas_click(&click);
    click.forget();

    let double_click = {
        let widget = Rc::clone(widget);
        Closure::<dyn FnMut()>::new(move || {
            with_widget(&widget, |widget| widget.on_double_click());
        })
    };
    bridge::on_canvas_double_click(&double_click);
    double_click.forget();
}

fn feature_events(widget: &SharedWidget) {
    let click = {
        let widget = Rc::clone(widget);
        Closure::<dyn FnMut(f64, JsValue) -> bool>::new(move |raw: f64, location: JsValue| {
            let (Some(key), Some(location)) = (key_from_js(raw), decode::<LatLng>(location, "feature click"))
            else {
                return false;
            };
            with_widget(&widget, |widget| widget.on_feature_click(key, location, now()))
                == Some(FeatureClick::Swallowed)
        })
    };
    bridge::on_feature_click(&click);
    click.forget();

    let hover = {
        let widget = Rc::clone(widget);
        Closure::<dyn FnMut(f64, bool)>::new(move |raw: f64, hovered: bool| {
            if let Some(key) = key_from_js(raw) {
                with_widget(&widget, |widget| widget.set_hovered(key, hovered));
            }
        })
    };
    bridge::on_feature_hover(&hover);
    hover.forget();

    let drag = {
        let widget = Rc::clone(widget);
        Closure::<dyn FnMut(f64, JsValue)>::new(move |raw: f64, location: JsValue| {
            if let (Some(key), Some(to)) = (key_from_js(raw), decode::<LatLng>(location, "drag")) {
                with_widget(&widget, |widget| widget.on_drag(key, to));
            }
        })
    };
    bridge::on_feature_drag(&drag);
    drag.forget();

    let drag_end = {
        let widget = Rc::clone(widget);
        Closure::<dyn FnMut(f64)>::new(move |raw: f64| {
            if let Some(key) = key_from_js(raw) {
                with_widget(&widget, |widget| {
                    widget.on_drag_end(key, now());
                });
            }
        })
    };
    bridge::on_feature_drag_end(&drag_end);
    drag_end.forget();
}

fn popup_actions(widget: &SharedWidget) {
    let action = {
        let widget = Rc::clone(widget);
        Closure::<dyn FnMut(JsValue)>::new(move |payload: JsValue| {
            let Some(action) = decode::<PopupAction>(payload, "popup action") else {
                return;
            };
            match with_widget(&widget, |widget| widget.popup_action(action, &Local, now())) {
                Some(Ok(Some(message))) => host::post_to_parent(&message),
                Some(Err(error)) => warn!(%error, "popup action rejected"),
                Some(Ok(None)) | None => {}
            }
        })
    };
    bridge::on_popup_action(&action);
    action.forget();
}

fn page_controls(widget: &SharedWidget) {
    let filter = {
        let widget = Rc::clone(widget);
        Closure::<dyn FnMut(JsValue)>::new(move |payload: JsValue| {
            let Some(change) = decode::<FilterChange>(payload, "filter change") else {
                return;
            };
            let key = FilterKey::parse(&change.key);
            let value = FilterValue::from_json(&key, &change.value);
            with_widget(&widget, |widget| widget.set_filter(key, value).update(now()));
        })
    };
    bridge::on_filter_change(&filter);
    filter.forget();

    let center = {
        let widget = Rc::clone(widget);
        Closure::<dyn FnMut(JsValue)>::new(move |payload: JsValue| {
            if let Some(request) = decode::<CenterRequest>(payload, "center request") {
                let location = LatLng::new(request.lat, request.lng);
                with_widget(&widget, |widget| widget.set_center(location, request.zoom));
            }
        })
    };
    bridge::on_set_center(&center);
    center.forget();
}
