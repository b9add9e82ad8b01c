//! The current installation.
//!
//! An installation is created locally with a fresh installation id the first
//! time it is asked for. It reaches the server through the ordinary object
//! operations; saves and fetches of the same installation update the slot.

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use busbar_parse_client::{Error, ErrorKind, Result, CLIENT_VERSION};

use crate::coding;
use crate::identity::{IdentityContainer, SlotKind};
use crate::object::ParseInstallation;

/// The server's `deviceType` for the running platform.
fn device_type() -> &'static str {
    match std::env::consts::OS {
        "macos" => "osx",
        other => other,
    }
}

impl super::ParseClient {
    /// The current installation.
    pub async fn current_installation<I: ParseInstallation>(&self) -> Result<I> {
        let container = self
            .session()
            .get(SlotKind::Installation)
            .await
            .ok_or_else(|| Error::new(ErrorKind::NoCurrentInstallation))?;
        coding::from_map(container.object)
    }

    /// The current installation, creating it locally when there is none.
    ///
    /// A new installation gets a fresh installation id and is not saved.
    pub async fn init_installation<I: ParseInstallation>(&self) -> Result<I> {
        if let Some(container) = self.session().get(SlotKind::Installation).await {
            if container.object.contains_key("installationId") {
                return coding::from_map(container.object);
            }
        }

        let installation_id = Uuid::new_v4().to_string();
        let mut fields = Map::new();
        fields.insert(
            "installationId".to_string(),
            Value::String(installation_id.clone()),
        );
        fields.insert(
            "deviceType".to_string(),
            Value::String(device_type().to_string()),
        );
        fields.insert(
            "parseVersion".to_string(),
            Value::String(CLIENT_VERSION.to_string()),
        );

        let installation = coding::from_map(fields.clone())?;
        self.session()
            .set(SlotKind::Installation, IdentityContainer::new(fields, None))
            .await;
        debug!(%installation_id, "created local installation");
        Ok(installation)
    }

    /// The current installation id, if an installation exists.
    pub async fn installation_id(&self) -> Option<String> {
        self.session().installation_id().await
    }
}
