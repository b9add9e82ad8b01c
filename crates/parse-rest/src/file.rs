//! File attachments.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use busbar_parse_client::security::url;
use busbar_parse_client::{Error, RequestMethod, RequestOption, RequestOptions, Result};

use crate::coding::SavedFile;
use crate::command::{Command, CommandBody};

/// A file stored by the server and referenced from object fields.
///
/// Saved when `url` is present. An unsaved file carries its bytes or a
/// local path; register it with
/// [`ObjectGraph::insert_file`](crate::ObjectGraph::insert_file) to have it
/// uploaded by deep-save, or upload it directly with
/// [`ParseClient::save_file`](crate::ParseClient::save_file).
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFile {
    pub name: String,
    pub url: Option<String>,
    /// Stable local identity, used to match the upload back to the file.
    pub local_id: Uuid,
    pub data: Option<Bytes>,
    pub local_path: Option<PathBuf>,
    pub mime_type: Option<String>,
}

impl ParseFile {
    /// An unsaved file with in-memory contents.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            url: None,
            local_id: Uuid::new_v4(),
            data: Some(data.into()),
            local_path: None,
            mime_type: None,
        }
    }

    /// An unsaved file streamed from disk on upload.
    pub fn from_path(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            url: None,
            local_id: Uuid::new_v4(),
            data: None,
            local_path: Some(path.as_ref().to_path_buf()),
            mime_type: None,
        }
    }

    /// A reference to a file the server already holds.
    pub fn saved(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            local_id: Uuid::new_v4(),
            data: None,
            local_path: None,
            mime_type: None,
        }
    }

    /// Set the content type sent on upload.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn is_saved(&self) -> bool {
        self.url.is_some()
    }

    /// The content type sent on upload: explicit, else guessed from the name.
    pub fn content_type(&self) -> String {
        match self.mime_type {
            Some(ref mime) => mime.clone(),
            None => mime_guess::from_path(&self.name)
                .first_or_octet_stream()
                .to_string(),
        }
    }

    /// `POST /files/<name>` with the raw contents.
    pub(crate) fn upload_command(&self) -> Result<Command<SavedFile>> {
        let body = match (&self.data, &self.local_path) {
            (Some(data), _) => CommandBody::Bytes(data.clone()),
            (None, Some(path)) => CommandBody::File(path.clone()),
            (None, None) => {
                return Err(Error::encoding(format!(
                    "file {} has no contents to upload",
                    self.name
                )))
            }
        };
        let path = format!("/files/{}", url::encode_path_segment(&self.name));
        Ok(Command::json(RequestMethod::Post, path).body(body))
    }

    /// Call options for the upload: `options` plus this file's content type.
    pub(crate) fn upload_options(&self, options: &RequestOptions) -> RequestOptions {
        options
            .clone()
            .with(RequestOption::MimeType(self.content_type()))
    }
}

impl Serialize for ParseFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("File", 3)?;
        state.serialize_field("__type", "File")?;
        state.serialize_field("name", &self.name)?;
        match self.url {
            Some(ref url) => state.serialize_field("url", url)?,
            None => state.serialize_field("localId", &self.local_id)?,
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for ParseFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Repr {
            #[serde(rename = "__type")]
            kind: String,
            name: String,
            #[serde(default)]
            url: Option<String>,
            #[serde(rename = "localId", default)]
            local_id: Option<Uuid>,
        }

        let repr = Repr::deserialize(deserializer)?;
        if repr.kind != "File" {
            return Err(D::Error::custom(format!(
                "expected a File, found __type {}",
                repr.kind
            )));
        }
        Ok(ParseFile {
            name: repr.name,
            url: repr.url,
            local_id: repr.local_id.unwrap_or_else(Uuid::new_v4),
            data: None,
            local_path: None,
            mime_type: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_saved_file_wire_shape() {
        let file = ParseFile::saved("a.txt", "http://files/a.txt");
        assert_eq!(
            serde_json::to_value(&file).unwrap(),
            json!({"__type": "File", "name": "a.txt", "url": "http://files/a.txt"})
        );
    }

    #[test]
    fn test_unsaved_file_keeps_local_id() {
        let file = ParseFile::from_bytes("a.txt", "hello");
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["localId"], json!(file.local_id.to_string()));

        let decoded: ParseFile = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.local_id, file.local_id);
        assert!(!decoded.is_saved());
        assert!(decoded.data.is_none());
    }

    #[test]
    fn test_upload_command() {
        let command = ParseFile::from_bytes("my file.txt", "hello")
            .upload_command()
            .unwrap();
        assert_eq!(command.path, "/files/my%20file.txt");
        assert!(matches!(command.body, Some(CommandBody::Bytes(_))));

        let err = ParseFile::saved("a.txt", "http://files/a.txt")
            .upload_command()
            .unwrap_err();
        assert!(matches!(err.kind, busbar_parse_client::ErrorKind::Encoding(_)));

        let options = ParseFile::from_bytes("a.png", "x").upload_options(&RequestOptions::new());
        assert!(options
            .iter()
            .any(|o| *o == RequestOption::MimeType("image/png".to_string())));
    }

    #[test]
    fn test_content_type() {
        assert_eq!(ParseFile::from_bytes("a.PNG", "x").content_type(), "image/png");
        assert_eq!(ParseFile::from_bytes("photo.webp", "x").content_type(), "image/webp");
        assert_eq!(ParseFile::from_bytes("module.wasm", "x").content_type(), "application/wasm");
        assert_eq!(
            ParseFile::from_bytes("blob", "x").content_type(),
            "application/octet-stream"
        );
        assert_eq!(
            ParseFile::from_bytes("a.txt", "x")
                .with_mime_type("text/markdown")
                .content_type(),
            "text/markdown"
        );
    }
}
