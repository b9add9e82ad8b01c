//! Typed references between objects.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::object::ParseObject;
use crate::types::Pointer;

/// Identity of an unsaved object inside an [`ObjectGraph`](crate::ObjectGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(Uuid);

impl LocalId {
    pub(crate) fn new() -> Self {
        LocalId(Uuid::new_v4())
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for LocalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(LocalId)
    }
}

impl Serialize for LocalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LocalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Where a link points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LinkTarget {
    /// A saved object.
    Saved(Pointer),
    /// An unsaved object held in an object graph.
    Unsaved(LocalId),
}

/// A field referencing another object of type `T`.
///
/// Saved targets are sent as pointers. Unsaved targets live in an
/// [`ObjectGraph`](crate::ObjectGraph) and are saved first by deep-save;
/// until then they are written locally as
/// `{"__type":"Pointer","className":..,"localId":..}`.
pub struct Link<T> {
    target: LinkTarget,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ParseObject> Link<T> {
    /// Link to a saved object by id.
    pub fn saved(object_id: impl Into<String>) -> Self {
        Self::from_target(LinkTarget::Saved(Pointer::new(T::CLASS_NAME, object_id)))
    }

    /// Link to a saved object.
    pub fn to(object: &T) -> busbar_parse_client::Result<Self> {
        Ok(Self::from_target(LinkTarget::Saved(object.pointer()?)))
    }

    pub(crate) fn unsaved(local_id: LocalId) -> Self {
        Self::from_target(LinkTarget::Unsaved(local_id))
    }

    fn from_target(target: LinkTarget) -> Self {
        Self {
            target,
            _marker: PhantomData,
        }
    }
}

impl<T> Link<T> {
    pub fn target(&self) -> &LinkTarget {
        &self.target
    }

    /// The pointer, if the target is saved.
    pub fn pointer(&self) -> Option<&Pointer> {
        match &self.target {
            LinkTarget::Saved(pointer) => Some(pointer),
            LinkTarget::Unsaved(_) => None,
        }
    }

    /// The target's object id, if saved.
    pub fn object_id(&self) -> Option<&str> {
        self.pointer().map(|p| p.object_id.as_str())
    }

    /// The graph identity, if unsaved.
    pub fn local_id(&self) -> Option<LocalId> {
        match self.target {
            LinkTarget::Unsaved(id) => Some(id),
            LinkTarget::Saved(_) => None,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self.target, LinkTarget::Saved(_))
    }
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Link<T> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl<T> Eq for Link<T> {}

impl<T> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Link").field(&self.target).finish()
    }
}

impl<T: ParseObject> Serialize for Link<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.target {
            LinkTarget::Saved(pointer) => pointer.serialize(serializer),
            LinkTarget::Unsaved(local_id) => {
                let mut state = serializer.serialize_struct("Pointer", 3)?;
                state.serialize_field("__type", "Pointer")?;
                state.serialize_field("className", T::CLASS_NAME)?;
                state.serialize_field("localId", local_id)?;
                state.end()
            }
        }
    }
}

impl<'de, T: ParseObject> Deserialize<'de> for Link<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Repr {
            #[serde(rename = "__type")]
            kind: String,
            #[serde(rename = "className")]
            class_name: String,
            #[serde(rename = "objectId", default)]
            object_id: Option<String>,
            #[serde(rename = "localId", default)]
            local_id: Option<LocalId>,
        }

        let repr = Repr::deserialize(deserializer)?;
        if repr.kind != "Pointer" && repr.kind != "Object" {
            return Err(D::Error::custom(format!(
                "expected a Pointer, found __type {}",
                repr.kind
            )));
        }
        if repr.class_name != T::CLASS_NAME {
            return Err(D::Error::custom(format!(
                "expected a pointer to {}, found {}",
                T::CLASS_NAME,
                repr.class_name
            )));
        }
        match (repr.object_id, repr.local_id) {
            (Some(object_id), _) => Ok(Link::from_target(LinkTarget::Saved(Pointer::new(
                repr.class_name,
                object_id,
            )))),
            (None, Some(local_id)) => Ok(Link::unsaved(local_id)),
            (None, None) => Err(D::Error::custom("pointer has neither objectId nor localId")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectMeta;
    use serde_json::json;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Tag {
        #[serde(flatten)]
        meta: ObjectMeta,
    }

    impl ParseObject for Tag {
        const CLASS_NAME: &'static str = "Tag";
        fn meta(&self) -> &ObjectMeta {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.meta
        }
    }

    #[test]
    fn test_saved_link_is_a_pointer() {
        let link = Link::<Tag>::saved("t1");
        assert_eq!(
            serde_json::to_value(&link).unwrap(),
            json!({"__type": "Pointer", "className": "Tag", "objectId": "t1"})
        );
        assert_eq!(link.object_id(), Some("t1"));
        assert!(link.is_saved());
    }

    #[test]
    fn test_unsaved_link_carries_local_id() {
        let local_id = LocalId::new();
        let link = Link::<Tag>::unsaved(local_id);
        let value = serde_json::to_value(&link).unwrap();
        assert_eq!(value["localId"], json!(local_id.to_string()));
        assert!(value.get("objectId").is_none());

        let decoded: Link<Tag> = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.local_id(), Some(local_id));
    }

    #[test]
    fn test_link_rejects_wrong_class() {
        let result: Result<Link<Tag>, _> = serde_json::from_value(json!({
            "__type": "Pointer",
            "className": "Note",
            "objectId": "n1"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_link_to_object() {
        let tag = Tag {
            meta: ObjectMeta::with_id("t9"),
        };
        assert_eq!(Link::to(&tag).unwrap(), Link::<Tag>::saved("t9"));
        assert!(Link::to(&Tag::default()).is_err());
    }
}
