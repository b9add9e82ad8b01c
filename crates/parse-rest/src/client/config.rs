//! Server config parameters and the current-config slot.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use busbar_parse_client::{Error, ErrorKind, RequestMethod, RequestOption, RequestOptions, Result};

use crate::coding;
use crate::command::Command;
use crate::identity::{IdentityContainer, SessionContext, SlotKind};

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    params: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    #[serde(default)]
    result: bool,
}

#[derive(Serialize)]
struct SaveRequest<'a> {
    params: &'a Map<String, Value>,
}

/// Replace the current config, or overlay `params` onto it.
async fn store_config(session: &SessionContext, params: Map<String, Value>, overlay: bool) {
    if overlay
        && session
            .merge_if_matches(SlotKind::Config, &params, None)
            .await
            .is_some()
    {
        return;
    }
    session
        .set(SlotKind::Config, IdentityContainer::new(params, None))
        .await;
}

impl super::ParseClient {
    /// Fetch the server config and make it the current config.
    #[instrument(skip(self, options))]
    pub async fn fetch_config<C: DeserializeOwned + Send + 'static>(
        &self,
        options: &RequestOptions,
    ) -> Result<C> {
        let session = Arc::clone(self.session());
        let command = Command::new(RequestMethod::Get, "/config", move |bytes: Bytes| {
            let session = Arc::clone(&session);
            async move {
                let response: FetchResponse = serde_json::from_slice(&bytes)?;
                let config = coding::from_map(response.params.clone())?;
                store_config(&session, response.params, false).await;
                Ok(config)
            }
        });
        self.execute(&command, options).await
    }

    /// Update server config parameters. Requires the master key.
    ///
    /// Returns whether the server accepted the update; accepted params are
    /// merged into the current config.
    #[instrument(skip(self, config, options))]
    pub async fn save_config<C: Serialize>(&self, config: &C, options: &RequestOptions) -> Result<bool> {
        let params = coding::to_map(config)?;
        let session = Arc::clone(self.session());
        let accepted = params.clone();
        let command = Command::new(RequestMethod::Put, "/config", move |bytes: Bytes| {
            let session = Arc::clone(&session);
            let accepted = accepted.clone();
            async move {
                let response: SaveResponse = serde_json::from_slice(&bytes)?;
                if response.result {
                    store_config(&session, accepted, true).await;
                }
                Ok(response.result)
            }
        })
        .json_body(&SaveRequest { params: &params })?;

        let options = options.clone().with(RequestOption::UseMasterKey);
        self.execute(&command, &options).await
    }

    /// The current config.
    pub async fn current_config<C: DeserializeOwned>(&self) -> Result<C> {
        let container = self
            .session()
            .get(SlotKind::Config)
            .await
            .ok_or_else(|| Error::new(ErrorKind::NoCurrentConfig))?;
        coding::from_map(container.object)
    }
}
