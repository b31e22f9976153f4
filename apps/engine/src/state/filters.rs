use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterKey {
    DateStart,
    DateEnd,
    Label,
    Other(String),
}

impl FilterKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DateStart => "dateStart",
            Self::DateEnd => "dateEnd",
            Self::Label => "label",
            Self::Other(name) => name,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "dateStart" => Self::DateStart,
            "dateEnd" => Self::DateEnd,
            "label" => Self::Label,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Date(DateTime<Utc>),
    Labels(Vec<String>),
    Text(String),
}

/// Returned by `FilterSet::get` for keys that are not set
static EMPTY: FilterValue = FilterValue::Text(String::new());

impl FilterValue {
    /// Only the empty string counts as falsy; an empty label list is a value.
    pub fn is_falsy(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }

    pub const fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn as_labels(&self) -> &[String] {
        match self {
            Self::Labels(labels) => labels,
            _ => &[],
        }
    }

    /// Reads a value sent by the page's filter controls. Date filters take an
    /// RFC 3339 timestamp. `null`, `false`, `0` and unparsable dates clear the
    /// filter.
    pub fn from_json(key: &FilterKey, value: &Value) -> Option<Self> {
        match (key, value) {
            (_, Value::Null | Value::Bool(false)) => None,
            (_, Value::Number(number)) if number.as_f64().is_some_and(|n| n.abs() < f64::EPSILON) => {
                None
            }
            (FilterKey::DateStart | FilterKey::DateEnd, Value::String(text)) if !text.is_empty() => {
                DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|date| Self::Date(date.with_timezone(&Utc)))
            }
            (_, Value::Array(items)) => Some(Self::Labels(
                items
                    .iter()
                    .map(|item| item.as_str().map_or_else(|| item.to_string(), str::to_string))
                    .collect(),
            )),
            (_, Value::String(text)) => Some(Self::Text(text.clone())),
            (_, other) => Some(Self::Text(other.to_string())),
        }
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(value: Vec<String>) -> Self {
        Self::Labels(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Inclusive `[start, end]` window over `created_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Active filters keyed by name. An absent key means the filter's default
/// policy applies.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    values: BTreeMap<FilterKey, FilterValue>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a filter. `None` or a falsy value clears the key instead of
    /// filtering on it.
    pub fn set(&mut self, key: FilterKey, value: impl Into<Option<FilterValue>>) -> &mut Self {
        match value.into() {
            Some(value) if !value.is_falsy() => {
                self.values.insert(key, value);
            }
            _ => {
                self.values.remove(&key);
            }
        }
        self
    }

    pub fn get(&self, key: &FilterKey) -> &FilterValue {
        self.values.get(key).unwrap_or(&EMPTY)
    }

    pub fn clear(&mut self, key: &FilterKey) -> &mut Self {
        self.values.remove(key);
        self
    }

    pub fn clear_all(&mut self) -> &mut Self {
        self.values.clear();
        self
    }

    /// Date window for this instant: start defaults to the epoch, end to `now`
    pub fn date_range(&self, now: DateTime<Utc>) -> DateRange {
        DateRange {
            start: self
                .get(&FilterKey::DateStart)
                .as_date()
                .unwrap_or(DateTime::UNIX_EPOCH),
            end: self.get(&FilterKey::DateEnd).as_date().unwrap_or(now),
        }
    }

    pub fn labels(&self) -> &[String] {
        self.get(&FilterKey::Label).as_labels()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn absent_key_reads_as_empty_string() {
        let filters = FilterSet::new();
        assert_eq!(filters.get(&FilterKey::Label), &FilterValue::Text(String::new()));
        assert!(filters.labels().is_empty());
    }

    #[test]
    fn falsy_value_clears_instead_of_filtering() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut filters = FilterSet::new();
        filters.set(FilterKey::DateStart, FilterValue::from(start));
        assert_eq!(filters.get(&FilterKey::DateStart).as_date(), Some(start));

        filters.set(FilterKey::DateStart, FilterValue::from(""));
        assert!(filters.is_empty());

        filters.set(FilterKey::DateStart, FilterValue::from(start));
        filters.set(FilterKey::DateStart, None::<FilterValue>);
        assert!(filters.is_empty());
    }

    #[test]
    fn empty_label_list_is_still_a_value() {
        let mut filters = FilterSet::new();
        filters.set(FilterKey::Label, FilterValue::from(Vec::<String>::new()));
        assert!(!filters.is_empty());
    }

    #[test]
    fn default_range_runs_from_epoch_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let range = FilterSet::new().date_range(now);

        assert_eq!(range.start, DateTime::UNIX_EPOCH);
        assert_eq!(range.end, now);
        assert!(range.contains(now));
        assert!(range.contains(DateTime::UNIX_EPOCH));
    }

    #[test]
    fn control_values_decode_per_key() {
        let start = FilterValue::from_json(&FilterKey::DateStart, &json!("2024-01-02T00:00:00+02:00"));
        assert_eq!(
            start.and_then(|value| value.as_date()),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap())
        );

        let labels = FilterValue::from_json(&FilterKey::Label, &json!([60, "61"]));
        assert_eq!(labels, Some(FilterValue::Labels(vec!["60".to_string(), "61".to_string()])));

        assert_eq!(FilterValue::from_json(&FilterKey::DateEnd, &Value::Null), None);
        assert_eq!(FilterValue::from_json(&FilterKey::DateEnd, &json!("yesterday")), None);

        let mut filters = FilterSet::new();
        filters.set(FilterKey::DateEnd, FilterValue::from_json(&FilterKey::DateEnd, &json!("")));
        assert!(filters.is_empty());
    }

    #[test]
    fn zero_and_false_from_controls_clear_the_filter() {
        let key = FilterKey::parse("category");
        let mut filters = FilterSet::new();

        filters.set(key.clone(), FilterValue::from_json(&key, &json!("parking")));
        assert_eq!(filters.get(&key), &FilterValue::from("parking"));

        filters.set(key.clone(), FilterValue::from_json(&key, &json!(0)));
        assert!(filters.is_empty());

        filters.set(key.clone(), FilterValue::from_json(&key, &json!("parking")));
        filters.set(key.clone(), FilterValue::from_json(&key, &json!(false)));
        assert!(filters.is_empty());
        assert_eq!(filters.get(&key), &FilterValue::from(""));

        assert_eq!(FilterValue::from_json(&key, &json!(0.0)), None);
        assert_eq!(FilterValue::from_json(&key, &json!(2)), Some(FilterValue::from("2")));
        assert_eq!(FilterValue::from_json(&key, &json!(true)), Some(FilterValue::from("true")));
    }

    #[test]
    fn keys_round_trip_through_their_wire_names() {
        for name in ["dateStart", "dateEnd", "label", "category"] {
            assert_eq!(FilterKey::parse(name).as_str(), name);
        }
    }
}
