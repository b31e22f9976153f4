// Core of the map widget; the browser binary only wires it to the page
pub mod config;
pub mod domain;
pub mod error;
pub mod host;
pub mod input;
pub mod pipeline;
pub mod state;
pub mod surface;
pub mod widget;

pub use config::WidgetConfig;
pub use domain::{Feature, FeatureId, Geometry, LatLng, Properties, Purpose, Style};
pub use error::{ConfigError, IngestError, MessageError};
pub use surface::Surface;
pub use widget::{ClickResolution, FeatureClick, Widget};
