//! Current user, installation and config.
//!
//! Each identity lives in a slot owned by a [`SessionContext`]. Slots load
//! lazily from the primary store (falling back to the secure mirror) and
//! every transition is written back to both stores. Transitions on one slot
//! are serialized by an async mutex that is never held across a network
//! call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use busbar_parse_client::security::redact;
use busbar_parse_storage::{get_json, keys, set_json, InMemoryStore, KeyValueStore};

/// Fields never kept in a slot's object.
const STRIPPED_KEYS: &[&str] = &["password", "sessionToken"];

/// The object held by a slot and its auxiliary token.
///
/// For the user slot the token is the session token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityContainer {
    pub object: Map<String, Value>,
    #[serde(rename = "sessionToken", default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl std::fmt::Debug for IdentityContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityContainer")
            .field("object", &self.object)
            .field("token", &redact::option(&self.token))
            .finish()
    }
}

impl IdentityContainer {
    /// Build a container, moving any `sessionToken` field into the token.
    pub fn new(object: Map<String, Value>, token: Option<String>) -> Self {
        let mut container = Self {
            object: Map::new(),
            token,
        };
        container.merge(&object, None);
        container
    }

    /// Overlay server fields onto the held object.
    ///
    /// Fields the server did not echo are kept. Applying the same fields
    /// twice leaves the container unchanged.
    pub fn merge(&mut self, fields: &Map<String, Value>, token: Option<String>) {
        for (key, value) in fields {
            if key == "sessionToken" {
                if let Some(token) = value.as_str() {
                    self.token = Some(token.to_string());
                }
                continue;
            }
            if STRIPPED_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.object.insert(key.clone(), value.clone());
        }
        if token.is_some() {
            self.token = token;
        }
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object.get("objectId").and_then(Value::as_str)
    }
}

/// Which identity a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    User,
    Installation,
    Config,
}

impl SlotKind {
    pub fn storage_key(self) -> &'static str {
        match self {
            SlotKind::User => keys::CURRENT_USER,
            SlotKind::Installation => keys::CURRENT_INSTALLATION,
            SlotKind::Config => keys::CURRENT_CONFIG,
        }
    }

    /// The slot that tracks objects of a class, if any.
    pub fn for_class(class_name: &str) -> Option<Self> {
        match class_name {
            "_User" => Some(SlotKind::User),
            "_Installation" => Some(SlotKind::Installation),
            _ => None,
        }
    }

    /// Whether `fields` describe the same object as the slot's current one.
    fn matches(self, current: &IdentityContainer, fields: &Map<String, Value>) -> bool {
        let same = |key: &str| match (current.object.get(key), fields.get(key)) {
            (Some(Value::String(a)), Some(Value::String(b))) => a == b,
            _ => false,
        };
        match self {
            SlotKind::User => same("objectId"),
            SlotKind::Installation => same("objectId") || same("installationId"),
            SlotKind::Config => true,
        }
    }
}

/// `None` until loaded from storage.
type SlotState = Option<Option<IdentityContainer>>;

/// Session state owned by one client handle.
///
/// ```rust,ignore
/// let session = SessionContext::in_memory();
/// session.set(SlotKind::User, IdentityContainer::new(fields, Some(token))).await;
/// assert!(session.session_token().await.is_some());
/// ```
#[derive(Debug)]
pub struct SessionContext {
    primary: Arc<dyn KeyValueStore>,
    secure: Option<Arc<dyn KeyValueStore>>,
    user: Mutex<SlotState>,
    installation: Mutex<SlotState>,
    config: Mutex<SlotState>,
}

impl SessionContext {
    /// Session backed by `primary`, with an optional secure mirror.
    pub fn new(primary: Arc<dyn KeyValueStore>, secure: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self {
            primary,
            secure,
            user: Mutex::new(None),
            installation: Mutex::new(None),
            config: Mutex::new(None),
        }
    }

    /// Session backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()), None)
    }

    fn slot(&self, kind: SlotKind) -> &Mutex<SlotState> {
        match kind {
            SlotKind::User => &self.user,
            SlotKind::Installation => &self.installation,
            SlotKind::Config => &self.config,
        }
    }

    /// The slot's container, loading it from storage on first access.
    pub async fn get(&self, kind: SlotKind) -> Option<IdentityContainer> {
        let mut state = self.slot(kind).lock().await;
        self.loaded(kind, &mut state).await.clone()
    }

    /// Replace the slot's container.
    pub async fn set(&self, kind: SlotKind, container: IdentityContainer) {
        let mut state = self.slot(kind).lock().await;
        self.persist(kind, Some(&container)).await;
        *state = Some(Some(container));
    }

    /// Empty the slot and its storage mirrors.
    pub async fn clear(&self, kind: SlotKind) {
        let mut state = self.slot(kind).lock().await;
        self.persist(kind, None).await;
        *state = Some(None);
    }

    /// Merge server fields into the slot if they describe its current object.
    ///
    /// Returns the updated container, or `None` when the slot is empty or
    /// holds a different object.
    pub async fn merge_if_matches(
        &self,
        kind: SlotKind,
        fields: &Map<String, Value>,
        token: Option<String>,
    ) -> Option<IdentityContainer> {
        let mut state = self.slot(kind).lock().await;
        let mut container = match self.loaded(kind, &mut state).await {
            Some(current) if kind.matches(current, fields) => current.clone(),
            _ => return None,
        };
        container.merge(fields, token);
        self.persist(kind, Some(&container)).await;
        *state = Some(Some(container.clone()));
        debug!(?kind, "merged server fields into current identity");
        Some(container)
    }

    /// Empty the slot if it holds the object with this id.
    pub async fn clear_if_matches(&self, kind: SlotKind, object_id: &str) -> bool {
        let mut state = self.slot(kind).lock().await;
        let matches = self
            .loaded(kind, &mut state)
            .await
            .as_ref()
            .and_then(IdentityContainer::object_id)
            == Some(object_id);
        if matches {
            self.persist(kind, None).await;
            *state = Some(None);
        }
        matches
    }

    /// The current user's session token.
    pub async fn session_token(&self) -> Option<String> {
        self.get(SlotKind::User).await.and_then(|c| c.token)
    }

    /// The current installation's id.
    pub async fn installation_id(&self) -> Option<String> {
        self.get(SlotKind::Installation)
            .await?
            .object
            .get("installationId")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    async fn loaded<'a>(
        &self,
        kind: SlotKind,
        state: &'a mut SlotState,
    ) -> &'a Option<IdentityContainer> {
        if state.is_none() {
            *state = Some(self.load(kind).await);
        }
        state.get_or_insert(None)
    }

    async fn load(&self, kind: SlotKind) -> Option<IdentityContainer> {
        let key = kind.storage_key();
        let stores = std::iter::once(&self.primary).chain(self.secure.iter());
        for store in stores {
            match get_json::<IdentityContainer>(store.as_ref(), key).await {
                Ok(Some(container)) => return Some(container),
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "failed to read identity from storage"),
            }
        }
        None
    }

    /// Write-through to every store. Failures are logged and otherwise ignored.
    async fn persist(&self, kind: SlotKind, container: Option<&IdentityContainer>) {
        let key = kind.storage_key();
        let stores = std::iter::once(&self.primary).chain(self.secure.iter());
        for store in stores {
            let result = match container {
                Some(container) => set_json(store.as_ref(), key, container).await,
                None => store.delete(key).await,
            };
            if let Err(e) = result {
                warn!(key, error = %e, "failed to write identity to storage");
            }
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_container_strips_secrets() {
        let container = IdentityContainer::new(
            map(json!({"objectId": "u1", "password": "pw", "sessionToken": "r:abc"})),
            None,
        );
        assert!(container.object.get("password").is_none());
        assert!(container.object.get("sessionToken").is_none());
        assert_eq!(container.token.as_deref(), Some("r:abc"));
        assert!(!format!("{:?}", container).contains("r:abc"));
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let session = SessionContext::in_memory();
        session
            .set(
                SlotKind::User,
                IdentityContainer::new(map(json!({"objectId": "u1", "nickname": "local"})), Some("t".into())),
            )
            .await;

        let response = map(json!({"objectId": "u1", "updatedAt": "2024-01-01T00:00:00.000Z"}));
        let first = session
            .merge_if_matches(SlotKind::User, &response, None)
            .await
            .unwrap();
        let second = session
            .merge_if_matches(SlotKind::User, &response, None)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.object["nickname"], "local");
        assert_eq!(second.object["updatedAt"], "2024-01-01T00:00:00.000Z");
        assert_eq!(second.token.as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn test_merge_ignores_other_objects() {
        let session = SessionContext::in_memory();
        assert!(session
            .merge_if_matches(SlotKind::User, &map(json!({"objectId": "u1"})), None)
            .await
            .is_none());

        session
            .set(SlotKind::User, IdentityContainer::new(map(json!({"objectId": "u1"})), None))
            .await;
        assert!(session
            .merge_if_matches(SlotKind::User, &map(json!({"objectId": "u2"})), None)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_slots_persist_and_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let secure = Arc::new(InMemoryStore::new());
        let session = SessionContext::new(Arc::clone(&store), Some(secure.clone()));
        session
            .set(
                SlotKind::Installation,
                IdentityContainer::new(map(json!({"installationId": "i-1"})), None),
            )
            .await;
        assert!(!secure.is_empty().await);

        let reloaded = SessionContext::new(store, None);
        assert_eq!(reloaded.installation_id().await.as_deref(), Some("i-1"));
    }

    #[tokio::test]
    async fn test_secure_mirror_is_fallback() {
        let secure = Arc::new(InMemoryStore::new());
        set_json(
            secure.as_ref(),
            keys::CURRENT_USER,
            &IdentityContainer::new(map(json!({"objectId": "u1"})), Some("r:1".into())),
        )
        .await
        .unwrap();

        let session = SessionContext::new(Arc::new(InMemoryStore::new()), Some(secure));
        assert_eq!(session.session_token().await.as_deref(), Some("r:1"));
    }

    #[tokio::test]
    async fn test_clear_if_matches() {
        let store = Arc::new(InMemoryStore::new());
        let session = SessionContext::new(store.clone(), None);
        session
            .set(SlotKind::User, IdentityContainer::new(map(json!({"objectId": "u1"})), None))
            .await;

        assert!(!session.clear_if_matches(SlotKind::User, "u2").await);
        assert!(session.clear_if_matches(SlotKind::User, "u1").await);
        assert!(session.get(SlotKind::User).await.is_none());
        assert!(store.is_empty().await);
    }
}
