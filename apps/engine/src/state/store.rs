use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::domain::{Feature, FeatureId};

/// Handle of a feature inside one store. Keys are never reused, so a key held
/// past removal simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FeatureKey(u64);

impl FeatureKey {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

/// What `FeatureStore::add` did with the incoming feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Inserted(FeatureKey),
    /// A feature with the same identity was retired first
    Replaced {
        retired: FeatureKey,
        key: FeatureKey,
    },
}

impl Insertion {
    pub const fn key(self) -> FeatureKey {
        match self {
            Self::Inserted(key) | Self::Replaced { key, .. } => key,
        }
    }

    pub const fn retired(self) -> Option<FeatureKey> {
        match self {
            Self::Inserted(_) => None,
            Self::Replaced { retired, .. } => Some(retired),
        }
    }
}

/// All features of the page, in insertion order.
///
/// Temporary features (unsaved comment placeholders) live in a separate
/// transient set: they can be looked up, selected and removed, but they never
/// take part in visibility or render passes.
#[derive(Debug, Default)]
pub struct FeatureStore {
    durable: IndexMap<FeatureKey, Feature>,
    transient: IndexMap<FeatureKey, Feature>,
    next_key: u64,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, feature: Feature) -> Insertion {
        let key = self.allocate();

        if feature.properties.temporary {
            trace!(key = key.get(), "adding temporary feature");
            self.transient.insert(key, feature);
            return Insertion::Inserted(key);
        }

        let retired = feature
            .identity
            .as_ref()
            .and_then(|identity| self.find_by_identity(identity));

        if let Some(retired) = retired {
            self.durable.shift_remove(&retired);
        }

        trace!(key = key.get(), identity = ?feature.identity, ?retired, "adding feature");
        self.durable.insert(key, feature);

        retired.map_or(Insertion::Inserted(key), |retired| Insertion::Replaced { retired, key })
    }

    pub fn find_by_identity(&self, identity: &FeatureId) -> Option<FeatureKey> {
        self.durable
            .iter()
            .find(|(_, feature)| feature.identity.as_ref() == Some(identity))
            .map(|(key, _)| *key)
    }

    /// First durable feature whose property `key` equals `value`; `id` matches
    /// against the identity
    pub fn find_by(&self, key: &str, value: &Value) -> Option<FeatureKey> {
        self.durable
            .iter()
            .find(|(_, feature)| {
                if key == "id" {
                    feature.identity.as_ref().map(FeatureId::to_value).as_ref() == Some(value)
                } else {
                    feature.properties.get(key).as_ref() == Some(value)
                }
            })
            .map(|(key, _)| *key)
    }

    pub fn get(&self, key: FeatureKey) -> Option<&Feature> {
        self.durable.get(&key).or_else(|| self.transient.get(&key))
    }

    pub fn get_mut(&mut self, key: FeatureKey) -> Option<&mut Feature> {
        match self.durable.get_mut(&key) {
            Some(feature) => Some(feature),
            None => self.transient.get_mut(&key),
        }
    }

    pub fn contains(&self, key: FeatureKey) -> bool {
        self.durable.contains_key(&key) || self.transient.contains_key(&key)
    }

    pub fn remove(&mut self, key: FeatureKey) -> Option<Feature> {
        self.durable
            .shift_remove(&key)
            .or_else(|| self.transient.shift_remove(&key))
    }

    /// Durable features in insertion order
    pub fn each(&self) -> impl Iterator<Item = (FeatureKey, &Feature)> + '_ {
        self.durable.iter().map(|(key, feature)| (*key, feature))
    }

    pub fn transient(&self) -> impl Iterator<Item = (FeatureKey, &Feature)> + '_ {
        self.transient.iter().map(|(key, feature)| (*key, feature))
    }

    pub fn len(&self) -> usize {
        self.durable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durable.is_empty()
    }

    fn allocate(&mut self) -> FeatureKey {
        let key = FeatureKey(self.next_key);
        self.next_key += 1;
        key
    }
}
