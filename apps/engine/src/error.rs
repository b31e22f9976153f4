use thiserror::Error;

/// Errors raised while turning inbound GeoJSON into features.
///
/// None of these abort an ingestion batch; the adapters log and skip the
/// offending feature.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a FeatureCollection, got {0}")]
    NotACollection(String),

    #[error("feature has no geometry")]
    MissingGeometry,

    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometry(String),

    #[error("malformed coordinates for {0} geometry")]
    MalformedCoordinates(&'static str),
}

/// Errors raised while decoding host messages or composing outbound ones.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("map data is not valid JSON: {0}")]
    MapData(#[from] serde_json::Error),

    #[error("invalid time of day: {0:?} (expected HH:MM)")]
    InvalidTime(String),

    #[error("local time {0} does not exist in the requested time zone")]
    NonexistentLocalTime(String),
}

/// Errors raised while reading the widget settings object.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid zoom range: min {min} is above max {max}")]
    ZoomRange { min: u8, max: u8 },

    #[error("click delay {delay_ms}ms must exceed the duplicate window {window_ms}ms")]
    ClickTiming { delay_ms: u64, window_ms: u64 },
}
