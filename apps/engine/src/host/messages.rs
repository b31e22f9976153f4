//! Message contract with the embedding page.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{FeatureId, LatLng};
use crate::error::MessageError;

/// A `message` event posted by the embedding page
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InboundMessage {
    pub message: String,
    pub instance_id: Value,
    pub plugin_purpose: Option<String>,
    pub comments: Option<Vec<Value>>,
    /// JSON text holding `boundary` and `existing`
    pub data: Option<Value>,
}

impl InboundMessage {
    /// Only `mapData` messages naming an instance are acted on
    pub fn is_map_data(&self) -> bool {
        self.message == "mapData" && is_truthy(&self.instance_id)
    }

    pub fn map_data(&self) -> Option<Result<MapData, MessageError>> {
        self.data.as_ref().map(parse_map_data)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n.abs() >= f64::EPSILON),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapData {
    pub boundary: Option<Value>,
    pub existing: Option<Value>,
}

/// Decodes the `data` field. The host normally sends it serialised; an
/// already-decoded object is accepted as well.
pub fn parse_map_data(data: &Value) -> Result<MapData, MessageError> {
    let parsed = match data {
        Value::String(text) => serde_json::from_str(text)?,
        other => serde_json::from_value(other.clone())?,
    };
    Ok(parsed)
}

/// Messages posted to the parent frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "message")]
pub enum OutboundMessage {
    #[serde(rename = "userData", rename_all = "camelCase")]
    UserData {
        instance_id: Value,
        comment: CommentPayload,
    },
    #[serde(rename = "userVote", rename_all = "camelCase")]
    UserVote {
        instance_id: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        comment_id: Option<Value>,
    },
}

impl OutboundMessage {
    pub fn comment(
        instance_id: Value,
        draft: CommentDraft,
        location: Option<LatLng>,
        linked: Option<&FeatureId>,
    ) -> Self {
        Self::UserData {
            instance_id,
            comment: draft.into_payload(location, linked),
        }
    }

    /// A plain vote for the selected comment, or an empty vote without one
    pub fn vote(instance_id: Value, selected: Option<&FeatureId>) -> Self {
        Self::UserVote {
            instance_id,
            comment_id: selected.map(FeatureId::to_value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentPayload {
    /// A Point feature, linked to the selected feature when there is one
    pub geojson: geojson::Feature,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_data: Option<PluginData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImagePayload {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginData {
    pub created_at: String,
}

/// A comment the user is about to send
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentDraft {
    pub title: Option<String>,
    pub content: String,
    pub image: Option<ImagePayload>,
    pub created_at: Option<DateTime<Utc>>,
}

impl CommentDraft {
    /// A rating is a comment with no text of its own
    pub fn rating(title: Option<String>) -> Self {
        Self {
            title,
            ..Self::default()
        }
    }

    pub fn into_payload(self, location: Option<LatLng>, linked: Option<&FeatureId>) -> CommentPayload {
        let position = location.map_or_else(|| vec![0.0, 0.0], LatLng::to_position);
        let mut properties = serde_json::Map::new();
        if let Some(linked) = linked {
            properties.insert("linked_id".to_string(), linked.to_value());
        }

        CommentPayload {
            geojson: geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::Point(position))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            },
            title: self.title,
            content: self.content,
            image: self.image,
            plugin_data: self.created_at.map(|created_at| PluginData {
                created_at: created_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            }),
        }
    }
}

/// Values read from the comment form inside a popup
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommentForm {
    pub title: Option<String>,
    pub content: Option<String>,
    /// Resized image as a data URL
    pub image_url: Option<String>,
    pub image_caption: Option<String>,
    pub date: Option<NaiveDate>,
    /// `HH:MM`
    pub time: Option<String>,
}

impl CommentForm {
    /// Builds the draft, reading date and time in the user's time zone
    pub fn into_draft<Tz: TimeZone>(self, tz: &Tz) -> Result<CommentDraft, MessageError> {
        let created_at = match (self.date, self.time.as_deref()) {
            (Some(date), Some(time)) => Some(compose_created_at(date, time, tz)?),
            _ => None,
        };

        let image = self.image_url.map(|image| ImagePayload {
            image,
            caption: self.image_caption,
        });

        Ok(CommentDraft {
            title: self.title,
            content: self.content.unwrap_or_default(),
            image,
            created_at,
        })
    }
}

/// Combines a picked date with an `HH:MM` time of day in `tz`
pub fn compose_created_at<Tz: TimeZone>(
    date: NaiveDate,
    time: &str,
    tz: &Tz,
) -> Result<DateTime<Utc>, MessageError> {
    let invalid = || MessageError::InvalidTime(time.to_string());

    let (hours, minutes) = time.trim().split_once(':').ok_or_else(invalid)?;
    let hours = hours.parse().map_err(|_| invalid())?;
    let minutes = minutes.parse().map_err(|_| invalid())?;
    let time_of_day = NaiveTime::from_hms_opt(hours, minutes, 0).ok_or_else(invalid)?;

    let local = date.and_time(time_of_day);
    tz.from_local_datetime(&local)
        .earliest()
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(|| MessageError::NonexistentLocalTime(local.to_string()))
}

/// Buttons and forms inside a popup, as reported by the page
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum PopupAction {
    AddComment {
        #[serde(default)]
        location: Option<LatLng>,
    },
    SubmitRating {
        #[serde(default)]
        title: Option<String>,
    },
    SubmitComment(CommentForm),
    SubmitVote,
    Dismiss,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use serde_json::json;

    #[test]
    fn map_data_needs_a_named_instance() {
        let message: InboundMessage =
            serde_json::from_value(json!({"message": "mapData", "instanceId": "w1"})).unwrap();
        assert!(message.is_map_data());

        let message: InboundMessage =
            serde_json::from_value(json!({"message": "mapData", "instanceId": ""})).unwrap();
        assert!(!message.is_map_data());

        let message: InboundMessage =
            serde_json::from_value(json!({"message": "resize", "instanceId": 3})).unwrap();
        assert!(!message.is_map_data());
    }

    #[test]
    fn serialised_data_is_decoded() {
        let message: InboundMessage = serde_json::from_value(json!({
            "message": "mapData",
            "instanceId": 1,
            "data": "{\"boundary\": {\"type\": \"FeatureCollection\", \"features\": []}}"
        }))
        .unwrap();

        let data = message.map_data().unwrap().unwrap();
        assert!(data.boundary.is_some());
        assert!(data.existing.is_none());
    }

    #[test]
    fn garbage_data_is_an_error() {
        let error = parse_map_data(&json!("{not json")).unwrap_err();
        assert!(matches!(error, MessageError::MapData(_)));
    }

    #[test]
    fn comment_message_carries_location_and_link() {
        let draft = CommentDraft {
            content: "Katettu teline".to_string(),
            image: Some(ImagePayload {
                image: "data:image/jpeg;base64,AAAA".to_string(),
                caption: None,
            }),
            ..CommentDraft::default()
        };
        let message = OutboundMessage::comment(
            json!("w1"),
            draft,
            Some(LatLng::new(60.17, 24.93)),
            Some(&FeatureId::from("route-4")),
        );

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "message": "userData",
                "instanceId": "w1",
                "comment": {
                    "geojson": {
                        "type": "Feature",
                        "properties": {"linked_id": "route-4"},
                        "geometry": {"type": "Point", "coordinates": [24.93, 60.17]}
                    },
                    "content": "Katettu teline",
                    "image": {"image": "data:image/jpeg;base64,AAAA"}
                }
            })
        );
    }

    #[test]
    fn vote_without_selection_is_empty() {
        let message = serde_json::to_value(OutboundMessage::vote(json!("w1"), None)).unwrap();
        assert_eq!(message, json!({"message": "userVote", "instanceId": "w1"}));

        let message =
            serde_json::to_value(OutboundMessage::vote(json!("w1"), Some(&FeatureId::Number(7))))
                .unwrap();
        assert_eq!(message["commentId"], json!(7));
    }

    #[test]
    fn form_date_and_time_are_read_in_the_local_zone() {
        let helsinki = FixedOffset::east_opt(2 * 3600).unwrap();
        let form = CommentForm {
            content: Some("Tässä".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 2, 3),
            time: Some("14:30".to_string()),
            ..CommentForm::default()
        };

        let draft = form.into_draft(&helsinki).unwrap();
        let payload = draft.into_payload(None, None);

        assert_eq!(
            payload.plugin_data.map(|data| data.created_at),
            Some("2024-02-03T12:30:00.000Z".to_string())
        );
        let geojson = serde_json::to_value(&payload.geojson).unwrap();
        assert_eq!(geojson["geometry"]["coordinates"], json!([0.0, 0.0]));
    }

    #[test]
    fn malformed_time_is_rejected() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 3).unwrap();
        for time in ["1430", "25:00", "ab:cd"] {
            let error = compose_created_at(date, time, &Utc).unwrap_err();
            assert!(matches!(error, MessageError::InvalidTime(_)));
        }
    }

    #[test]
    fn popup_actions_decode_from_their_wire_names() {
        let action: PopupAction = serde_json::from_value(json!({"action": "dismiss"})).unwrap();
        assert_eq!(action, PopupAction::Dismiss);

        let action: PopupAction = serde_json::from_value(json!({
            "action": "submit-comment",
            "content": "Hyvä paikka",
            "date": "2024-02-03",
            "time": "08:15"
        }))
        .unwrap();
        assert!(matches!(action, PopupAction::SubmitComment(form) if form.time.as_deref() == Some("08:15")));

        let action: PopupAction = serde_json::from_value(json!({
            "action": "add-comment",
            "location": {"lat": 60.2, "lng": 24.9}
        }))
        .unwrap();
        assert_eq!(
            action,
            PopupAction::AddComment {
                location: Some(LatLng::new(60.2, 24.9))
            }
        );
    }
}
