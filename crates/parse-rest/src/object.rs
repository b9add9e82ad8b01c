//! The domain object capability set and the built-in user/installation types.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use busbar_parse_client::security::url;
use busbar_parse_client::{Error, Result};

use crate::acl::Acl;
use crate::types::Pointer;

/// Server-managed fields shared by every object.
///
/// Embed with `#[serde(flatten)]`:
///
/// ```rust,ignore
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Note {
///     #[serde(flatten)]
///     meta: ObjectMeta,
///     title: String,
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::types::timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::types::timestamp"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "ACL", default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Acl>,
}

impl ObjectMeta {
    /// Metadata for an object that already exists on the server.
    pub fn with_id(object_id: impl Into<String>) -> Self {
        Self {
            object_id: Some(object_id.into()),
            ..Self::default()
        }
    }
}

/// A typed object stored in a server class.
pub trait ParseObject: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The server class (collection) name.
    const CLASS_NAME: &'static str;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// The server-assigned id, absent until the first save.
    fn object_id(&self) -> Option<&str> {
        self.meta().object_id.as_deref()
    }

    /// The REST path for this object.
    fn endpoint(&self) -> String {
        endpoint(Self::CLASS_NAME, self.object_id())
    }

    /// A pointer to this object. Fails if it has never been saved.
    fn pointer(&self) -> Result<Pointer> {
        let object_id = self
            .object_id()
            .ok_or_else(|| Error::missing_identifier(format!("{} has no objectId", Self::CLASS_NAME)))?;
        Ok(Pointer::new(Self::CLASS_NAME, object_id))
    }

    /// Whether both objects refer to the same saved record.
    fn has_same_object_id<O: ParseObject>(&self, other: &O) -> bool {
        Self::CLASS_NAME == O::CLASS_NAME
            && self.object_id().is_some()
            && self.object_id() == other.object_id()
    }
}

/// Marker for types stored in the `_User` class.
pub trait ParseUser: ParseObject {}

/// Marker for types stored in the `_Installation` class.
pub trait ParseInstallation: ParseObject {}

/// The REST path for a class, and optionally one object in it.
pub fn endpoint(class_name: &str, object_id: Option<&str>) -> String {
    let base = match class_name {
        "_User" => "/users".to_string(),
        "_Installation" => "/installations".to_string(),
        "_Role" => "/roles".to_string(),
        "_Session" => "/sessions".to_string(),
        other => format!("/classes/{}", url::encode_path_segment(other)),
    };
    match object_id {
        Some(id) => format!("{}/{}", base, url::encode_path_segment(id)),
        None => base,
    }
}

/// A user in the `_User` class.
///
/// Fields the struct does not name are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_data: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// A new user with credentials, ready for sign-up.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }
}

impl ParseObject for User {
    const CLASS_NAME: &'static str = "_User";

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

impl ParseUser for User {}

/// A device installation in the `_Installation` class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale_identifier: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParseObject for Installation {
    const CLASS_NAME: &'static str = "_Installation";

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

impl ParseInstallation for Installation {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_endpoints() {
        assert_eq!(endpoint("Note", None), "/classes/Note");
        assert_eq!(endpoint("Note", Some("abc")), "/classes/Note/abc");
        assert_eq!(endpoint("_User", Some("u1")), "/users/u1");
        assert_eq!(endpoint("_Installation", None), "/installations");
        assert_eq!(endpoint("_Role", None), "/roles");
        assert_eq!(endpoint("_Session", Some("s")), "/sessions/s");
        assert_eq!(endpoint("Note", Some("a/b")), "/classes/Note/a%2Fb");
    }

    #[test]
    fn test_meta_wire_shape() {
        let meta = ObjectMeta {
            object_id: Some("abc".to_string()),
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            updated_at: None,
            acl: None,
        };
        assert_eq!(
            serde_json::to_value(&meta).unwrap(),
            json!({"objectId": "abc", "createdAt": "2024-01-01T00:00:00.000Z"})
        );
    }

    #[test]
    fn test_user_keeps_unknown_fields() {
        let user: User = serde_json::from_value(json!({
            "objectId": "u1",
            "username": "ada",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "favoriteColor": "green"
        }))
        .unwrap();

        assert_eq!(user.object_id(), Some("u1"));
        assert_eq!(user.username.as_deref(), Some("ada"));
        assert_eq!(user.extra.get("favoriteColor"), Some(&json!("green")));
        assert!(user.extra.get("objectId").is_none());
        assert_eq!(user.endpoint(), "/users/u1");
    }

    #[test]
    fn test_pointer_requires_id() {
        let user = User::new("ada", "pw");
        assert!(user.pointer().is_err());

        let mut saved = user.clone();
        saved.meta.object_id = Some("u1".to_string());
        assert_eq!(saved.pointer().unwrap(), Pointer::new("_User", "u1"));
        assert!(saved.has_same_object_id(&saved.clone()));
        assert!(!user.has_same_object_id(&user));
    }
}
