use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::PopupOptions;
use crate::domain::{Feature, LatLng};
use crate::state::store::FeatureKey;

/// One popup binding. Every `open` builds a new value with a fresh `seq`, so
/// the surface never patches stale content into an old popup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub seq: u64,
    pub feature: FeatureKey,
    pub anchor: Option<LatLng>,
    pub template: Option<String>,
    pub options: PopupOptions,
    /// Properties handed to the popup template
    pub context: Map<String, Value>,
}

/// Single-selection state: at most one selected feature and the anchor of
/// its popup.
#[derive(Debug, Default)]
pub struct Selection {
    selected: Option<FeatureKey>,
    focused: Option<LatLng>,
    popup: Option<Popup>,
    next_seq: u64,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn selected(&self) -> Option<FeatureKey> {
        self.selected
    }

    pub const fn focused(&self) -> Option<LatLng> {
        self.focused
    }

    pub const fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    pub fn is_selected(&self, key: FeatureKey) -> bool {
        self.selected == Some(key)
    }

    /// Replaces the selection wholesale; `None` clears it
    pub fn select(&mut self, feature: Option<FeatureKey>) {
        if self.selected != feature {
            self.popup = None;
        }
        self.selected = feature;
    }

    /// Selects `key` and binds a fresh popup to it.
    ///
    /// The anchor is `location` when given, else the last focused location,
    /// else the feature's own point.
    pub fn open(
        &mut self,
        key: FeatureKey,
        feature: &Feature,
        location: Option<LatLng>,
        options: PopupOptions,
        context: Map<String, Value>,
    ) -> &Popup {
        self.select(Some(key));

        let anchor = location
            .or(self.focused)
            .or_else(|| feature.geometry.as_point());

        self.next_seq += 1;
        self.focused = anchor;

        self.popup.insert(Popup {
            seq: self.next_seq,
            feature: key,
            anchor,
            template: feature.properties.template.clone(),
            options,
            context,
        })
    }

    /// Clears selection and focus, returning what was selected
    pub fn close(&mut self) -> Option<FeatureKey> {
        self.popup = None;
        self.focused = None;
        self.selected.take()
    }
}
