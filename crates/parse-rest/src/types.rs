//! Wire types with a `__type` tag: pointers, dates and bytes.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A reference to a saved object: `{"__type":"Pointer","className":..,"objectId":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub class_name: String,
    pub object_id: String,
}

impl Pointer {
    /// Create a pointer.
    pub fn new(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: object_id.into(),
        }
    }

    /// The pointer as a JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "__type": "Pointer",
            "className": self.class_name,
            "objectId": self.object_id,
        })
    }
}

impl Serialize for Pointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Pointer", 3)?;
        state.serialize_field("__type", "Pointer")?;
        state.serialize_field("className", &self.class_name)?;
        state.serialize_field("objectId", &self.object_id)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Pointer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Repr {
            #[serde(rename = "__type")]
            kind: String,
            #[serde(rename = "className")]
            class_name: String,
            #[serde(rename = "objectId")]
            object_id: String,
        }

        let repr = Repr::deserialize(deserializer)?;
        // Included objects arrive as `__type: Object` with the same keys.
        if repr.kind != "Pointer" && repr.kind != "Object" {
            return Err(D::Error::custom(format!(
                "expected a Pointer, found __type {}",
                repr.kind
            )));
        }
        Ok(Pointer {
            class_name: repr.class_name,
            object_id: repr.object_id,
        })
    }
}

/// Format a timestamp the way the server does: millisecond precision, `Z`.
pub fn format_iso(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse a server timestamp.
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// A date field stored inside an object: `{"__type":"Date","iso":..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParseDate(pub DateTime<Utc>);

impl ParseDate {
    /// The current time, truncated to what the wire can carry.
    pub fn now() -> Self {
        let now = Utc::now();
        ParseDate(parse_iso(&format_iso(&now)).unwrap_or(now))
    }
}

impl From<DateTime<Utc>> for ParseDate {
    fn from(date: DateTime<Utc>) -> Self {
        ParseDate(date)
    }
}

impl Serialize for ParseDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Date", 2)?;
        state.serialize_field("__type", "Date")?;
        state.serialize_field("iso", &format_iso(&self.0))?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ParseDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = DateRepr::deserialize(deserializer)?;
        raw.into_date().map(ParseDate).map_err(D::Error::custom)
    }
}

/// Either wire form of a date: a bare ISO string or a tagged object.
#[derive(Deserialize)]
#[serde(untagged)]
enum DateRepr {
    Plain(String),
    Tagged { iso: String },
}

impl DateRepr {
    fn into_date(self) -> Result<DateTime<Utc>, String> {
        let iso = match self {
            DateRepr::Plain(iso) | DateRepr::Tagged { iso } => iso,
        };
        parse_iso(&iso).ok_or_else(|| format!("invalid date: {}", iso))
    }
}

/// Serde adapter for the `createdAt`/`updatedAt` metadata timestamps.
///
/// Serializes as a bare ISO string; accepts either wire form.
pub mod timestamp {
    use super::{format_iso, DateRepr};
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_str(&format_iso(date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<DateRepr>::deserialize(deserializer)? {
            Some(raw) => raw.into_date().map(Some).map_err(D::Error::custom),
            None => Ok(None),
        }
    }
}

/// Binary data stored inside an object: `{"__type":"Bytes","base64":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParseBytes(pub Vec<u8>);

impl Serialize for ParseBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.0);
        let mut state = serializer.serialize_struct("Bytes", 2)?;
        state.serialize_field("__type", "Bytes")?;
        state.serialize_field("base64", &encoded)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ParseBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Repr {
            base64: String,
        }

        let repr = Repr::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(repr.base64.as_bytes())
            .map(ParseBytes)
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_pointer_wire_shape() {
        let pointer = Pointer::new("Tag", "t1");
        assert_eq!(
            serde_json::to_value(&pointer).unwrap(),
            json!({"__type": "Pointer", "className": "Tag", "objectId": "t1"})
        );
        assert_eq!(pointer.to_value(), serde_json::to_value(&pointer).unwrap());

        let decoded: Pointer =
            serde_json::from_value(json!({"__type": "Pointer", "className": "Tag", "objectId": "t1"}))
                .unwrap();
        assert_eq!(decoded, pointer);
    }

    #[test]
    fn test_pointer_accepts_included_object() {
        let decoded: Pointer = serde_json::from_value(json!({
            "__type": "Object",
            "className": "Tag",
            "objectId": "t1",
            "name": "x"
        }))
        .unwrap();
        assert_eq!(decoded.object_id, "t1");
    }

    #[test]
    fn test_pointer_rejects_other_types() {
        let result: Result<Pointer, _> = serde_json::from_value(json!({
            "__type": "File",
            "className": "Tag",
            "objectId": "t1"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_iso_format_has_millis() {
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_iso(&date), "2024-01-02T03:04:05.000Z");
        assert_eq!(parse_iso("2024-01-02T03:04:05.000Z"), Some(date));
        assert_eq!(parse_iso("yesterday"), None);
    }

    #[test]
    fn test_parse_date_forms() {
        let date = ParseDate(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(
            serde_json::to_value(date).unwrap(),
            json!({"__type": "Date", "iso": "2024-01-02T03:04:05.000Z"})
        );

        let tagged: ParseDate =
            serde_json::from_value(json!({"__type": "Date", "iso": "2024-01-02T03:04:05.000Z"}))
                .unwrap();
        let plain: ParseDate = serde_json::from_value(json!("2024-01-02T03:04:05.000Z")).unwrap();
        assert_eq!(tagged, date);
        assert_eq!(plain, date);
    }

    #[test]
    fn test_bytes_wire_shape() {
        let bytes = ParseBytes(b"hello".to_vec());
        let value = serde_json::to_value(&bytes).unwrap();
        assert_eq!(value, json!({"__type": "Bytes", "base64": "aGVsbG8="}));
        let decoded: ParseBytes = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, bytes);
    }
}
