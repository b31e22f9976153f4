use std::cell::RefCell;
use std::rc::Rc;

use map_widget_engine::{Widget, WidgetConfig};
use tracing::{error, info, warn};
use wasm_bindgen::JsValue;

mod bridge;
mod events;
mod host;
mod logging;
mod surface;

use host::SharedWidget;
use surface::LeafletSurface;

/// Global the embedding page may set before the widget loads
const CONFIG_GLOBAL: &str = "mapWidgetConfig";

fn main() {
    let (config, problem) = read_config();
    logging::init(config.debug);
    if let Some(problem) = problem {
        warn!(%problem, "using default settings");
    }

    let surface = LeafletSurface::new(config.clusters.clone());
    let widget: SharedWidget = Rc::new(RefCell::new(Widget::new(config, surface)));

    events::wire(&widget);
    if let Err(error) = host::listen(Rc::clone(&widget)) {
        error!(?error, "could not listen for host messages");
        return;
    }

    info!("map widget ready");
}

/// Reads `window.mapWidgetConfig`. Absent settings are not a problem; broken
/// ones are reported once logging is up.
fn read_config() -> (WidgetConfig, Option<String>) {
    let Some(window) = web_sys::window() else {
        return (WidgetConfig::default(), None);
    };

    let raw = match js_sys::Reflect::get(&window, &JsValue::from_str(CONFIG_GLOBAL)) {
        Ok(raw) if !raw.is_undefined() && !raw.is_null() => raw,
        _ => return (WidgetConfig::default(), None),
    };

    let text = match js_sys::JSON::stringify(&raw) {
        Ok(text) => String::from(text),
        Err(_) => {
            return (
                WidgetConfig::default(),
                Some(format!("{CONFIG_GLOBAL} is not serialisable")),
            )
        }
    };

    match WidgetConfig::from_json(&text) {
        Ok(config) => (config, None),
        Err(error) => (WidgetConfig::default(), Some(error.to_string())),
    }
}
