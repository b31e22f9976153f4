use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, TimeDelta, Utc};
use map_widget_engine::host::{InboundMessage, OutboundMessage};
use map_widget_engine::input::PendingClick;
use map_widget_engine::{ClickResolution, Widget};
use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use tracing::{debug, trace, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::MessageEvent;

use crate::surface::LeafletSurface;

pub type SharedWidget = Rc<RefCell<Widget<LeafletSurface>>>;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Runs `f` on the widget unless it is already borrowed further up the
/// stack. Leaflet fires some events synchronously while the widget is
/// driving it; those are dropped.
pub fn with_widget<R>(
    widget: &SharedWidget,
    f: impl FnOnce(&mut Widget<LeafletSurface>) -> R,
) -> Option<R> {
    match widget.try_borrow_mut() {
        Ok(mut widget) => Some(f(&mut widget)),
        Err(_) => {
            debug!("widget busy, dropping re-entrant event");
            None
        }
    }
}

/// Subscribes to `message` events from the embedding page
pub fn listen(widget: SharedWidget) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;

    let handler = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
        let message: InboundMessage = match serde_wasm_bindgen::from_value(event.data()) {
            Ok(message) => message,
            Err(error) => {
                trace!(%error, "ignoring unreadable message");
                return;
            }
        };
        with_widget(&widget, |widget| widget.receive(&message, now()));
    });

    window.add_event_listener_with_callback("message", handler.as_ref().unchecked_ref())?;
    handler.forget();
    Ok(())
}

pub fn post_to_parent(message: &OutboundMessage) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let parent = match window.parent() {
        Ok(Some(parent)) => parent,
        Ok(None) => {
            warn!("no parent frame to post to");
            return;
        }
        Err(error) => {
            warn!(?error, "parent frame is not reachable");
            return;
        }
    };

    let value = match message.serialize(&Serializer::json_compatible()) {
        Ok(value) => value,
        Err(error) => {
            warn!(%error, "could not serialise outbound message");
            return;
        }
    };

    if let Err(error) = parent.post_message(&value, "*") {
        warn!(?error, "posting to parent failed");
    }
}

/// Hands `pending` back to the widget once its delay has passed. The timer is
/// never cleared; the widget drops it if something newer happened meanwhile.
pub fn schedule_click(widget: &SharedWidget, pending: PendingClick) {
    let delay = i32::try_from(pending.delay.as_millis()).unwrap_or(i32::MAX);
    arm(widget, pending, delay);
}

fn arm(widget: &SharedWidget, pending: PendingClick, delay_ms: i32) {
    let Some(window) = web_sys::window() else {
        return;
    };

    let widget = Rc::clone(widget);
    let callback = Closure::once_into_js(move || {
        let at = now();
        let resolution = with_widget(&widget, |widget| widget.resolve_click(&pending, at));
        if resolution == Some(ClickResolution::NotDue) {
            trace!("click timer fired early, re-arming");
            arm(&widget, pending, remaining_ms(&pending, at));
        }
    });

    if let Err(error) =
        window.set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), delay_ms)
    {
        warn!(?error, "could not schedule click resolution");
    }
}

fn remaining_ms(pending: &PendingClick, at: DateTime<Utc>) -> i32 {
    let remaining = TimeDelta::from_std(pending.delay)
        .ok()
        .and_then(|delay| pending.clicked_at.checked_add_signed(delay))
        .map_or(1, |due| (due - at).num_milliseconds().max(1));
    i32::try_from(remaining).unwrap_or(i32::MAX)
}
