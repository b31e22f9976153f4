//! Adapters turning host payloads into features.
//!
//! The host data is untrusted in shape: missing fields get defaults, and a
//! feature that cannot be decoded is logged and skipped without failing the
//! rest of the batch.

use chrono::DateTime;
use geojson::GeoJson;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::CommentSettings;
use crate::domain::{geojson_kind, Feature, Geometry, LatLng, Style};
use crate::error::IngestError;

/// Decodes a GeoJSON `FeatureCollection`, skipping undecodable features
pub fn parse_collection(payload: &Value) -> Result<Vec<Feature>, IngestError> {
    match serde_json::from_value::<GeoJson>(payload.clone()) {
        Ok(GeoJson::FeatureCollection(collection)) => Ok(collection
            .features
            .into_iter()
            .filter_map(|feature| keep_or_skip(Feature::try_from(feature)))
            .collect()),
        Ok(GeoJson::Feature(_)) => Err(IngestError::NotACollection("Feature".to_string())),
        Ok(GeoJson::Geometry(geometry)) => Err(IngestError::NotACollection(
            geojson_kind(&geometry.value).to_string(),
        )),
        Err(error) => decode_members(payload, error),
    }
}

/// A single broken member fails the collection as a whole; this decodes the
/// members one at a time so the rest survive.
fn decode_members(payload: &Value, error: serde_json::Error) -> Result<Vec<Feature>, IngestError> {
    let kind = payload.get("type").and_then(Value::as_str).unwrap_or("unknown");
    if kind != "FeatureCollection" {
        return Err(IngestError::NotACollection(kind.to_string()));
    }
    let members = payload
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| IngestError::Json(error))?;

    debug!(members = members.len(), "decoding collection member by member");
    Ok(members
        .iter()
        .filter_map(|member| keep_or_skip(Feature::from_json(member.clone())))
        .collect())
}

fn keep_or_skip(decoded: Result<Feature, IngestError>) -> Option<Feature> {
    match decoded {
        Ok(feature) => Some(feature),
        Err(error) => {
            warn!(%error, "skipping feature");
            None
        }
    }
}

/// Builds comment markers from the host's comment records.
///
/// A record whose `geojson` is an object carries its own geometry. Any other
/// `geojson` value references an existing feature; such comments get a
/// placeholder point and link to it.
pub fn adapt_comments(records: &[Value], settings: &CommentSettings) -> Vec<Feature> {
    records
        .iter()
        .filter_map(|record| {
            let Some(fields) = record.as_object() else {
                warn!(record = %record, "skipping comment that is not an object");
                return None;
            };
            keep_or_skip(Feature::from_json(comment_feature(fields, settings)))
        })
        .collect()
}

fn comment_feature(record: &Map<String, Value>, settings: &CommentSettings) -> Value {
    let mut feature = match record.get("geojson") {
        Some(geojson @ Value::Object(_)) => geojson.clone(),
        other => json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [0, 0]},
            "properties": {"linked_id": [other.cloned().unwrap_or(Value::Null)]},
        }),
    };

    if let Some(object) = feature.as_object_mut() {
        let properties = object
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        if !properties.is_object() {
            *properties = Value::Object(Map::new());
        }
        if let Value::Object(properties) = properties {
            for (key, value) in record {
                if key != "geojson" {
                    properties.insert(key.clone(), value.clone());
                }
            }
            fill_comment_defaults(properties, settings);
        }
    }

    feature
}

fn fill_comment_defaults(properties: &mut Map<String, Value>, settings: &CommentSettings) {
    properties.insert("title".to_string(), json!(settings.title));

    let votes = properties.entry("n_votes").or_insert(json!(0));
    let weight = votes.as_f64().map_or(1.0, |votes| votes + 1.0);
    properties.insert("weight".to_string(), json!(weight));

    properties
        .entry("author_name")
        .or_insert_with(|| json!(settings.anonymous_author));

    let content = properties
        .get("content")
        .map_or_else(String::new, |content| format!("<p>{}</p>", text_of(Some(content))));
    properties.insert("content".to_string(), json!(content));

    let first_image = properties
        .get("images")
        .and_then(Value::as_array)
        .and_then(|images| images.first())
        .cloned();
    if let Some(image) = first_image {
        properties.insert("image".to_string(), image);
    }

    let linked = match properties.get("linked_id") {
        Some(Value::String(linked)) => Some(json!([linked])),
        _ => None,
    };
    if let Some(linked) = linked {
        properties.insert("linked_id".to_string(), linked);
    }

    let plugin_created_at = properties
        .get("plugin_data")
        .and_then(|data| data.get("created_at"))
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(created_at) = plugin_created_at {
        match DateTime::parse_from_rfc3339(&created_at) {
            Ok(parsed) => {
                let date_string = parsed.format("%d.%m.%Y %H:%M:%S").to_string();
                properties.insert("date_string".to_string(), json!(date_string));
                properties.insert("created_at".to_string(), json!(created_at));
            }
            Err(error) => warn!(%error, %created_at, "ignoring unparsable plugin_data.created_at"),
        }
    }

    properties.insert("clickable".to_string(), json!(true));
    properties.insert("template".to_string(), json!(settings.view_template));
}

/// Marks every boundary feature as a permanent blocker. Polygons get the
/// world ring as a new outer ring, which turns each area into a hole in a
/// mask covering the rest of the world.
pub fn adapt_boundary(collection: &Value, world_ring: &[LatLng]) -> Result<Vec<Feature>, IngestError> {
    let mut features = parse_collection(collection)?;

    for feature in &mut features {
        feature.properties.blocker = true;
        feature.properties.permanent = true;
        feature.properties.style = Some(mask_style());

        if let Geometry::Polygon(rings) = &mut feature.geometry {
            rings.insert(0, world_ring.to_vec());
        }
    }

    Ok(features)
}

fn mask_style() -> Style {
    let style = json!({
        "className": "leaflet-click-dragblocker",
        "clickable": true,
        "color": "#000",
        "fill": "#000",
        "fillOpacity": 0.25,
        "opacity": 0.25,
        "weight": 1,
    });
    Style::new(style.as_object().cloned().unwrap_or_default())
}

/// Turns route lines into permanent, rateable features
pub fn adapt_routes(
    collection: &Value,
    brand_color: &str,
    settings: &CommentSettings,
) -> Result<Vec<Feature>, IngestError> {
    let mut features = parse_collection(collection)?;

    for feature in &mut features {
        let properties = &mut feature.properties;
        properties.permanent = true;
        properties.template = Some(settings.rating_template.clone());

        let mut style = Map::new();
        style.insert("color".to_string(), json!(brand_color));
        style.insert("lineCap".to_string(), json!("round"));
        style.insert("opacity".to_string(), json!(0.5));
        style.insert("weight".to_string(), json!(10));
        properties.style = Some(Style::new(style));

        let title = properties.extra.get("name").cloned().unwrap_or(Value::Null);
        let content = format!(
            "<p>{} ({})</p>",
            text_of(properties.extra.get("winter_mai")),
            text_of(properties.extra.get("winter_mai_1")),
        );
        properties.extra.insert("title".to_string(), title);
        properties.extra.insert("content".to_string(), json!(content));
    }

    Ok(features)
}

/// Text form of a property for template content; strings are not quoted
fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
