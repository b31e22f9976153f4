use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::IngestError;

/// A WGS84 coordinate in the order the drawing surface uses (latitude first).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// GeoJSON position, longitude first
    pub fn to_position(self) -> geojson::Position {
        vec![self.lng, self.lat]
    }

    /// Reads a GeoJSON position; altitude is dropped
    pub fn from_lng_lat(position: &[f64]) -> Option<Self> {
        match position {
            [lng, lat, ..] => Some(Self::new(*lat, *lng)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(LatLng),
    LineString(Vec<LatLng>),
    /// Ordered rings; the first one is the outer ring
    Polygon(Vec<Vec<LatLng>>),
}

impl Geometry {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::LineString(_) => "LineString",
            Self::Polygon(_) => "Polygon",
        }
    }

    pub const fn as_point(&self) -> Option<LatLng> {
        match self {
            Self::Point(point) => Some(*point),
            _ => None,
        }
    }

    pub fn rings(&self) -> &[Vec<LatLng>] {
        match self {
            Self::Polygon(rings) => rings,
            _ => &[],
        }
    }
}

/// GeoJSON type name of a decoded geometry value
pub const fn geojson_kind(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn path(positions: &[geojson::Position]) -> Option<Vec<LatLng>> {
    positions
        .iter()
        .map(|position| LatLng::from_lng_lat(position))
        .collect()
}

fn positions(points: &[LatLng]) -> Vec<geojson::Position> {
    points.iter().map(|point| point.to_position()).collect()
}

impl TryFrom<&geojson::Value> for Geometry {
    type Error = IngestError;

    fn try_from(value: &geojson::Value) -> Result<Self, IngestError> {
        match value {
            geojson::Value::Point(position) => LatLng::from_lng_lat(position)
                .map(Self::Point)
                .ok_or(IngestError::MalformedCoordinates("Point")),
            geojson::Value::LineString(line) => path(line)
                .map(Self::LineString)
                .ok_or(IngestError::MalformedCoordinates("LineString")),
            geojson::Value::Polygon(rings) => rings
                .iter()
                .map(|ring| path(ring))
                .collect::<Option<Vec<_>>>()
                .map(Self::Polygon)
                .ok_or(IngestError::MalformedCoordinates("Polygon")),
            other => Err(IngestError::UnsupportedGeometry(geojson_kind(other).to_string())),
        }
    }
}

impl From<&Geometry> for geojson::Geometry {
    fn from(geometry: &Geometry) -> Self {
        let value = match geometry {
            Geometry::Point(point) => geojson::Value::Point(point.to_position()),
            Geometry::LineString(line) => geojson::Value::LineString(positions(line)),
            Geometry::Polygon(rings) => {
                geojson::Value::Polygon(rings.iter().map(|ring| positions(ring)).collect())
            }
        };
        Self::new(value)
    }
}

impl Serialize for Geometry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        geojson::Geometry::from(self).serialize(serializer)
    }
}

/// Stable external key of a feature, e.g. a comment id from the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    Number(i64),
    Text(String),
}

impl FeatureId {
    /// Reads an id from a JSON value; `null`, objects and arrays carry no id
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Some(
                number
                    .as_i64()
                    .map_or_else(|| Self::Text(number.to_string()), Self::Number),
            ),
            Value::String(text) if !text.is_empty() => Some(Self::Text(text.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(number) => json!(number),
            Self::Text(text) => json!(text),
        }
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for FeatureId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

/// Visual hint handed to the drawing surface. The engine only ever touches
/// `color` and `opacity`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Style(Map<String, Value>);

impl Style {
    pub const fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    pub fn color(&self) -> Option<&str> {
        self.0.get("color").and_then(Value::as_str)
    }

    pub fn opacity(&self) -> Option<f64> {
        self.0.get("opacity").and_then(Value::as_f64)
    }

    #[must_use]
    pub fn with_color(mut self, color: &str) -> Self {
        self.0.insert("color".to_string(), json!(color));
        self
    }

    #[must_use]
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.0.insert("opacity".to_string(), json!(opacity));
        self
    }

    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Typed feature attributes.
///
/// Keys the engine interprets get their own field; everything else (author,
/// vote counts, rendered content) lands in `extra` untouched and is only
/// passed through to popup templates.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    pub created_at: Option<DateTime<Utc>>,
    pub permanent: bool,
    pub weight: f64,
    pub draggable: bool,
    pub blocker: bool,
    pub clickable: bool,
    pub temporary: bool,
    pub style: Option<Style>,
    pub template: Option<String>,
    pub linked_identities: Vec<FeatureId>,
    pub extra: Map<String, Value>,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            created_at: None,
            permanent: false,
            weight: 1.0,
            draggable: false,
            blocker: false,
            clickable: false,
            temporary: false,
            style: None,
            template: None,
            linked_identities: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Properties {
    /// Splits a GeoJSON property bag into typed fields and the extension map.
    /// `id` is not a property here; callers read it as the feature identity.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        map.remove("id");

        let flag = |map: &mut Map<String, Value>, key: &str| {
            map.remove(key).and_then(|v| v.as_bool()).unwrap_or(false)
        };

        let permanent = flag(&mut map, "permanent");
        let draggable = flag(&mut map, "draggable");
        let blocker = flag(&mut map, "blocker");
        let clickable = flag(&mut map, "clickable");
        let temporary = flag(&mut map, "temporary");

        let weight = map
            .remove("weight")
            .and_then(|v| v.as_f64())
            .filter(|w| w.is_finite() && *w > 0.0)
            .unwrap_or(1.0);

        let created_at = map.remove("created_at").as_ref().and_then(parse_timestamp);

        let style = match map.remove("style") {
            Some(Value::Object(style)) => Some(Style::new(style)),
            _ => None,
        };

        let template = match map.remove("template") {
            Some(Value::String(template)) => Some(template),
            _ => None,
        };

        let linked_identities = match map.remove("linked_id") {
            Some(Value::Array(ids)) => ids.iter().filter_map(FeatureId::from_value).collect(),
            Some(single) => FeatureId::from_value(&single).into_iter().collect(),
            None => Vec::new(),
        };

        Self {
            created_at,
            permanent,
            weight,
            draggable,
            blocker,
            clickable,
            temporary,
            style,
            template,
            linked_identities,
            extra: map,
        }
    }

    /// Reassembles the property bag in its wire shape
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.extra.clone();

        if let Some(created_at) = self.created_at {
            map.insert("created_at".to_string(), json!(created_at.to_rfc3339()));
        }
        map.insert("permanent".to_string(), json!(self.permanent));
        map.insert("weight".to_string(), json!(self.weight));
        map.insert("draggable".to_string(), json!(self.draggable));
        map.insert("blocker".to_string(), json!(self.blocker));
        map.insert("clickable".to_string(), json!(self.clickable));
        map.insert("temporary".to_string(), json!(self.temporary));
        if let Some(style) = &self.style {
            map.insert("style".to_string(), Value::Object(style.as_map().clone()));
        }
        if let Some(template) = &self.template {
            map.insert("template".to_string(), json!(template));
        }
        if !self.linked_identities.is_empty() {
            let ids = self.linked_identities.iter().map(FeatureId::to_value).collect();
            map.insert("linked_id".to_string(), Value::Array(ids));
        }

        map
    }

    /// Looks a property up by its wire name
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "created_at" => self.created_at.map(|t| json!(t.to_rfc3339())),
            "permanent" => Some(json!(self.permanent)),
            "weight" => Some(json!(self.weight)),
            "draggable" => Some(json!(self.draggable)),
            "blocker" => Some(json!(self.blocker)),
            "clickable" => Some(json!(self.clickable)),
            "temporary" => Some(json!(self.temporary)),
            "style" => self.style.as_ref().map(|s| Value::Object(s.as_map().clone())),
            "template" => self.template.as_ref().map(|t| json!(t)),
            _ => self.extra.get(key).cloned(),
        }
    }
}

/// Accepts RFC 3339 strings and epoch milliseconds
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub identity: Option<FeatureId>,
    pub geometry: Geometry,
    pub properties: Properties,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            identity: None,
            geometry,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<FeatureId>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Decodes a GeoJSON `Feature` object. A missing property bag counts as
    /// an empty one.
    pub fn from_json(mut value: Value) -> Result<Self, IngestError> {
        if let Some(object) = value.as_object_mut() {
            object
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let feature: geojson::Feature = serde_json::from_value(value)?;
        Self::try_from(feature)
    }
}

/// `properties.id` wins over the GeoJSON member `id`
impl TryFrom<geojson::Feature> for Feature {
    type Error = IngestError;

    fn try_from(feature: geojson::Feature) -> Result<Self, IngestError> {
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or(IngestError::MissingGeometry)
            .and_then(|geometry| Geometry::try_from(&geometry.value))?;

        let properties = feature.properties.unwrap_or_default();
        let identity = properties
            .get("id")
            .and_then(FeatureId::from_value)
            .or_else(|| match feature.id {
                Some(geojson::feature::Id::String(text)) => FeatureId::from_value(&Value::String(text)),
                Some(geojson::feature::Id::Number(number)) => FeatureId::from_value(&Value::Number(number)),
                None => None,
            });

        Ok(Self {
            identity,
            geometry,
            properties: Properties::from_map(properties),
        })
    }
}

impl From<&Feature> for geojson::Feature {
    fn from(feature: &Feature) -> Self {
        let mut properties = feature.properties.to_map();
        if let Some(identity) = &feature.identity {
            properties.insert("id".to_string(), identity.to_value());
        }

        Self {
            bbox: None,
            geometry: Some(geojson::Geometry::from(&feature.geometry)),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        geojson::Feature::from(self).serialize(serializer)
    }
}

/// Display mode selected by the host ("plugin purpose")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    PostComments,
    ViewComments,
    ViewHeatmap,
}

impl Purpose {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PostComments => "postComments",
            Self::ViewComments => "viewComments",
            Self::ViewHeatmap => "viewHeatmap",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "postComments" => Some(Self::PostComments),
            "viewComments" => Some(Self::ViewComments),
            "viewHeatmap" => Some(Self::ViewHeatmap),
            _ => None,
        }
    }

    pub const fn uses_clusters(self) -> bool {
        matches!(self, Self::PostComments | Self::ViewComments)
    }
}
