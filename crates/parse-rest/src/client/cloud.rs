//! Cloud code: functions and background jobs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use busbar_parse_client::security::url;
use busbar_parse_client::{RequestMethod, RequestOption, RequestOptions, Result};

use crate::command::Command;

#[derive(Debug, Deserialize)]
struct FunctionResponse<R> {
    result: R,
}

impl super::ParseClient {
    /// Run a cloud function and decode its `result`.
    #[instrument(skip(self, params, options))]
    pub async fn call_function<R, P>(
        &self,
        name: &str,
        params: &P,
        options: &RequestOptions,
    ) -> Result<R>
    where
        R: DeserializeOwned + Send + 'static,
        P: Serialize + ?Sized,
    {
        let path = format!("/functions/{}", url::encode_path_segment(name));
        let command = Command::<FunctionResponse<R>>::json(RequestMethod::Post, path)
            .json_body(params)?
            .map(|response| Ok(response.result));
        self.execute(&command, options).await
    }

    /// Start a background job. Requires the master key.
    #[instrument(skip(self, params, options))]
    pub async fn start_job<P: Serialize + ?Sized>(
        &self,
        name: &str,
        params: &P,
        options: &RequestOptions,
    ) -> Result<()> {
        let path = format!("/jobs/{}", url::encode_path_segment(name));
        let command = Command::<Value>::json(RequestMethod::Post, path).json_body(params)?;
        let options = options.clone().with(RequestOption::UseMasterKey);
        self.execute(&command, &options).await.map(|_| ())
    }
}
