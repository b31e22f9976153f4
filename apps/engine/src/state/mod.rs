// Page-lifetime widget state: features, filters and the current selection

pub mod filters;
pub mod selection;
pub mod store;

pub use filters::{DateRange, FilterKey, FilterSet, FilterValue};
pub use selection::{Popup, Selection};
pub use store::{FeatureKey, FeatureStore, Insertion};
