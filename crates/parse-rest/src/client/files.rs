//! File upload, download and deletion.

use bytes::Bytes;
use serde_json::Value;
use tracing::instrument;

use busbar_parse_client::security::url;
use busbar_parse_client::{
    Error, ProgressSink, RequestMethod, RequestOption, RequestOptions, Result,
};

use crate::command::Command;
use crate::file::ParseFile;

impl super::ParseClient {
    /// Upload a file. Does nothing if it is already saved.
    ///
    /// The server may rename the file; `name` and `url` are updated from
    /// its response.
    #[instrument(skip(self, file, options, progress), fields(name = %file.name))]
    pub async fn save_file(
        &self,
        file: &mut ParseFile,
        options: &RequestOptions,
        progress: Option<ProgressSink>,
    ) -> Result<()> {
        if file.is_saved() {
            return Ok(());
        }
        let command = file.upload_command()?.upload_progress(progress);
        let saved = self
            .execute(&command, &file.upload_options(options))
            .await?;
        file.name = saved.name;
        file.url = Some(saved.url);
        Ok(())
    }

    /// Download a saved file's contents into `data`.
    #[instrument(skip(self, file, options, progress), fields(name = %file.name))]
    pub async fn fetch_file(
        &self,
        file: &mut ParseFile,
        options: &RequestOptions,
        progress: Option<ProgressSink>,
    ) -> Result<()> {
        let location = file
            .url
            .clone()
            .ok_or_else(|| Error::missing_identifier(format!("file {} has no url", file.name)))?;
        let command = Command::<Bytes>::with_decoder(RequestMethod::Get, location, |bytes| Ok(bytes))
            .download_progress(progress);
        file.data = Some(self.execute(&command, options).await?);
        Ok(())
    }

    /// Delete a saved file. Requires the master key.
    #[instrument(skip(self, file, options), fields(name = %file.name))]
    pub async fn delete_file(&self, file: &ParseFile, options: &RequestOptions) -> Result<()> {
        if !file.is_saved() {
            return Err(Error::missing_identifier(format!(
                "file {} was never saved",
                file.name
            )));
        }
        let path = format!("/files/{}", url::encode_path_segment(&file.name));
        let command = Command::<Value>::json(RequestMethod::Delete, path);
        let options = options.clone().with(RequestOption::UseMasterKey);
        self.execute(&command, &options).await.map(|_| ())
    }
}
