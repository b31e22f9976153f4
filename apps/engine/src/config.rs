use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::LatLng;
use crate::error::ConfigError;

/// Settings for one widget instance.
///
/// Every field has a default, so the embedding page only needs to provide the
/// values it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    pub center: LatLng,
    pub initial_zoom: u8,
    /// Zoom used by `set_center` when the caller does not pass one
    pub focus_zoom: u8,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub world_bounds: WorldBounds,
    pub brand_color: String,
    pub clusters: ClusterSettings,
    pub heatmap: HeatmapSettings,
    pub popup: PopupOptions,
    pub click: ClickSettings,
    pub comments: CommentSettings,
    pub debug: bool,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            center: LatLng::new(60.1708, 24.9375),
            initial_zoom: 9,
            focus_zoom: 12,
            min_zoom: 3,
            max_zoom: 15,
            world_bounds: WorldBounds::default(),
            brand_color: "#0078A8".to_string(),
            clusters: ClusterSettings::default(),
            heatmap: HeatmapSettings::default(),
            popup: PopupOptions::default(),
            click: ClickSettings::default(),
            comments: CommentSettings::default(),
            debug: false,
        }
    }
}

impl WidgetConfig {
    /// Parses settings from the JSON object supplied by the embedding page
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Pulls `zoom` into `[min_zoom, max_zoom]`
    pub fn clamp_zoom(&self, zoom: u8) -> u8 {
        zoom.clamp(self.min_zoom, self.max_zoom.max(self.min_zoom))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::ZoomRange {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }

        if self.click.single_click_delay_ms <= self.click.duplicate_window_ms {
            return Err(ConfigError::ClickTiming {
                delay_ms: self.click.single_click_delay_ms,
                window_ms: self.click.duplicate_window_ms,
            });
        }

        Ok(())
    }
}

/// Extent of the projected world, used to build the "rest of world" mask
/// around boundary polygons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Default for WorldBounds {
    fn default() -> Self {
        // EPSG:3067 extent unprojected to WGS84
        Self {
            south_west: LatLng::new(55.617_905, 10.260_880),
            north_east: LatLng::new(72.853_334, 60.789_531),
        }
    }
}

impl WorldBounds {
    /// Closed outer ring running NE, NW, SW, SE and back to NE
    pub fn ring(&self) -> Vec<LatLng> {
        let ne = self.north_east;
        let sw = self.south_west;
        vec![
            LatLng::new(ne.lat, ne.lng),
            LatLng::new(ne.lat, sw.lng),
            LatLng::new(sw.lat, sw.lng),
            LatLng::new(sw.lat, ne.lng),
            LatLng::new(ne.lat, ne.lng),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub disable_clustering_at_zoom: u8,
    pub show_coverage_on_hover: bool,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            disable_clustering_at_zoom: 13,
            show_coverage_on_hover: false,
        }
    }
}

/// Fixed display parameters pushed to the heat layer on every render pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeatmapSettings {
    pub blur: u32,
    pub min_opacity: u32,
    pub pane: String,
    pub radius: u32,
    pub z_index: i32,
}

impl Default for HeatmapSettings {
    fn default() -> Self {
        Self {
            blur: 30,
            min_opacity: 50,
            pane: "tilePane".to_string(),
            radius: 20,
            z_index: -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PopupOptions {
    pub close_button: bool,
    pub min_width: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for PopupOptions {
    fn default() -> Self {
        Self {
            close_button: false,
            min_width: 240,
            max_width: 240,
            max_height: 400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickSettings {
    /// Canvas clicks closer than this to the last interaction are duplicates
    pub duplicate_window_ms: u64,
    /// How long a single click waits for a competing click or double click
    pub single_click_delay_ms: u64,
}

impl Default for ClickSettings {
    fn default() -> Self {
        Self {
            duplicate_window_ms: 50,
            single_click_delay_ms: 200,
        }
    }
}

impl ClickSettings {
    pub const fn duplicate_window(&self) -> Duration {
        Duration::from_millis(self.duplicate_window_ms)
    }

    pub const fn single_click_delay(&self) -> Duration {
        Duration::from_millis(self.single_click_delay_ms)
    }
}

/// Text and template identifiers used when adapting and creating comments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentSettings {
    pub title: String,
    pub anonymous_author: String,
    pub add_template: String,
    pub view_template: String,
    pub rating_template: String,
}

impl Default for CommentSettings {
    fn default() -> Self {
        Self {
            title: "Tähän tarvitaan teline".to_string(),
            anonymous_author: "Anonyymi".to_string(),
            add_template: "template-add-comment".to_string(),
            view_template: "template-view-comment".to_string(),
            rating_template: "template-view-rating".to_string(),
        }
    }
}
