//! Object encoding: canonical form, wire bodies and child discovery.
//!
//! Objects are first serialized to their canonical JSON map, which keeps
//! unsaved links and files as `localId` references. Wire bodies are derived
//! from the canonical map by substituting every reference that deep-save has
//! already resolved and stripping server-managed keys.

use std::collections::HashMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use busbar_parse_client::{Error, ErrorKind, Result};

use crate::link::LocalId;
use crate::object::ParseObject;
use crate::types::Pointer;

/// Keys the server owns; never sent in a request body.
const SERVER_KEYS: &[&str] = &[
    "objectId",
    "createdAt",
    "updatedAt",
    "className",
    "sessionToken",
    "emailVerified",
];

/// A file the server has stored: the upload response `{name, url}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SavedFile {
    pub name: String,
    pub url: String,
}

/// Children already saved during one deep-save, keyed by local identity.
#[derive(Debug, Clone, Default)]
pub struct ResolvedChildren {
    pub objects: HashMap<LocalId, Pointer>,
    pub files: HashMap<Uuid, SavedFile>,
}

impl ResolvedChildren {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.files.is_empty()
    }
}

/// Unsaved references found while walking an object, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unresolved {
    pub objects: Vec<LocalId>,
    pub files: Vec<Uuid>,
}

impl Unresolved {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len() + self.files.len()
    }

    fn push_object(&mut self, id: LocalId) {
        if !self.objects.contains(&id) {
            self.objects.push(id);
        }
    }

    fn push_file(&mut self, id: Uuid) {
        if !self.files.contains(&id) {
            self.files.push(id);
        }
    }
}

/// Serialize a value that must encode as a JSON object.
pub fn to_map<T: Serialize + ?Sized>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::encoding(format!(
            "expected an object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(Error::with_source(ErrorKind::Encoding(e.to_string()), e)),
    }
}

/// Deserialize a typed value from a JSON map.
pub fn from_map<T: DeserializeOwned>(map: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(map)).map_err(Into::into)
}

/// Canonical bytes for an object, as kept in local storage.
pub fn encode<T: ParseObject>(object: &T) -> Result<Bytes> {
    serde_json::to_vec(object)
        .map(Bytes::from)
        .map_err(|e| Error::with_source(ErrorKind::Encoding(e.to_string()), e))
}

/// Decode an object from its canonical bytes.
pub fn decode<T: ParseObject>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(Into::into)
}

/// Split a write or fetch response into object fields and session token.
///
/// A response carrying `createdAt` without `updatedAt` describes a create,
/// including a `PUT` that the server treated as one; both timestamps are
/// then the creation time.
pub fn server_fields(mut response: Map<String, Value>) -> (Map<String, Value>, Option<String>) {
    let token = match response.remove("sessionToken") {
        Some(Value::String(token)) => Some(token),
        _ => None,
    };
    if !response.contains_key("updatedAt") {
        if let Some(created) = response.get("createdAt").cloned() {
            response.insert("updatedAt".to_string(), created);
        }
    }
    (response, token)
}

/// Unsaved references in `map` that `resolved` cannot satisfy.
pub fn collect_unresolved(map: &Map<String, Value>, resolved: &ResolvedChildren) -> Unresolved {
    let mut unresolved = Unresolved::default();
    for value in map.values() {
        substitute(value, resolved, &mut unresolved);
    }
    unresolved
}

/// Replace resolved references in `map`, leaving unresolved ones as they are.
pub fn resolve_links(map: &Map<String, Value>, resolved: &ResolvedChildren) -> Map<String, Value> {
    let mut unresolved = Unresolved::default();
    map.iter()
        .map(|(k, v)| (k.clone(), substitute(v, resolved, &mut unresolved)))
        .collect()
}

/// Build the request body for an object.
///
/// Fails if any unsaved reference is not in `resolved`: an unsaved object
/// can never appear on the wire. `objectId` is kept only when the caller
/// assigns ids itself.
pub fn encode_body(
    map: &Map<String, Value>,
    resolved: &ResolvedChildren,
    keep_object_id: bool,
) -> Result<Value> {
    let mut unresolved = Unresolved::default();
    let mut body = Map::with_capacity(map.len());
    for (key, value) in map {
        let is_server_key = SERVER_KEYS.contains(&key.as_str());
        if is_server_key && !(keep_object_id && key == "objectId") {
            continue;
        }
        body.insert(key.clone(), substitute(value, resolved, &mut unresolved));
    }

    if !unresolved.is_empty() {
        return Err(Error::encoding(format!(
            "{} unsaved object(s) and {} unsaved file(s) must be saved before this object",
            unresolved.objects.len(),
            unresolved.files.len()
        )));
    }
    Ok(Value::Object(body))
}

enum Reference {
    Object(LocalId),
    File(Uuid),
}

fn unsaved_reference(map: &Map<String, Value>) -> Option<Reference> {
    let local_id = map.get("localId")?.as_str()?;
    match map.get("__type")?.as_str()? {
        "Pointer" if !map.contains_key("objectId") => local_id.parse().ok().map(Reference::Object),
        "File" if !map.contains_key("url") => Uuid::parse_str(local_id).ok().map(Reference::File),
        _ => None,
    }
}

fn substitute(value: &Value, resolved: &ResolvedChildren, unresolved: &mut Unresolved) -> Value {
    match value {
        Value::Object(map) => {
            match unsaved_reference(map) {
                Some(Reference::Object(id)) => match resolved.objects.get(&id) {
                    Some(pointer) => return pointer.to_value(),
                    None => {
                        unresolved.push_object(id);
                        return value.clone();
                    }
                },
                Some(Reference::File(id)) => match resolved.files.get(&id) {
                    Some(file) => {
                        return serde_json::json!({
                            "__type": "File",
                            "name": file.name,
                            "url": file.url,
                        })
                    }
                    None => {
                        unresolved.push_file(id);
                        return value.clone();
                    }
                },
                None => {}
            }
            Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), substitute(v, resolved, unresolved)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| substitute(v, resolved, unresolved))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
