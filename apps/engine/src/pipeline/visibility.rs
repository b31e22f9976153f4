use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::domain::Feature;
use crate::state::{FeatureKey, FeatureStore, FilterSet};

/// Per-cycle fields derived from cross-feature links. Rebuilt from scratch on
/// every pass and never stored on the features themselves.
#[derive(Debug, Clone, Default)]
pub struct DerivedFields {
    linked: HashMap<FeatureKey, Vec<FeatureKey>>,
    rating: HashMap<FeatureKey, BTreeMap<String, u32>>,
}

impl DerivedFields {
    fn reset(store: &FeatureStore) -> Self {
        let mut fields = Self::default();
        for (key, _) in store.each() {
            fields.linked.insert(key, Vec::new());
            fields.rating.insert(key, BTreeMap::new());
        }
        fields
    }

    pub fn linked(&self, key: FeatureKey) -> &[FeatureKey] {
        self.linked.get(&key).map_or(&[], Vec::as_slice)
    }

    pub fn rating(&self, key: FeatureKey) -> Option<&BTreeMap<String, u32>> {
        self.rating.get(&key)
    }
}

/// Output of one visibility pass
#[derive(Debug, Clone)]
pub struct Visibility {
    visible: IndexSet<FeatureKey>,
    max_weight: f64,
    derived: DerivedFields,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            visible: IndexSet::new(),
            max_weight: 1.0,
            derived: DerivedFields::default(),
        }
    }
}

impl Visibility {
    pub fn is_visible(&self, key: FeatureKey) -> bool {
        self.visible.contains(&key)
    }

    pub fn visible(&self) -> impl Iterator<Item = FeatureKey> + '_ {
        self.visible.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Heaviest weight in the whole store, never below 1
    pub const fn max_weight(&self) -> f64 {
        self.max_weight
    }

    pub const fn derived(&self) -> &DerivedFields {
        &self.derived
    }

    pub fn into_derived(self) -> DerivedFields {
        self.derived
    }
}

/// Computes which durable features are visible under `filters` at `now`.
///
/// `max_weight` covers every feature, visible or not, so heat intensities stay
/// comparable while filters change.
pub fn resolve(store: &FeatureStore, filters: &FilterSet, now: DateTime<Utc>) -> Visibility {
    let derived = DerivedFields::reset(store);

    let max_weight = store
        .each()
        .map(|(_, feature)| feature.properties.weight)
        .fold(1.0_f64, f64::max);

    let range = filters.date_range(now);
    let labels = filters.labels();

    let mut visible = IndexSet::new();
    for (key, feature) in store.each() {
        if feature.properties.permanent {
            visible.insert(key);
            continue;
        }

        // Undated features are stamped with the current instant each pass
        let created_at = feature.properties.created_at.unwrap_or(now);
        if !range.contains(created_at) {
            continue;
        }

        if !admitted_by_labels(feature, labels) || forwards_to_links(feature) {
            continue;
        }

        visible.insert(key);
    }

    debug!(
        total = store.len(),
        visible = visible.len(),
        max_weight,
        "resolved visibility"
    );

    Visibility {
        visible,
        max_weight,
        derived,
    }
}

/// Label filtering is switched off: every feature passes whatever labels are
/// selected.
const fn admitted_by_labels(_feature: &Feature, _labels: &[String]) -> bool {
    true
}

/// Features carrying `linked_id` would hand their label to the linked
/// features' `linked`/`rating` fields instead of being drawn. Disabled, so
/// nothing is forwarded and the derived fields stay empty.
const fn forwards_to_links(_feature: &Feature) -> bool {
    false
}
