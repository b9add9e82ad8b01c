//! Batch planning: run many same-shape commands in as few round-trips as the
//! server's batch limit allows.
//!
//! Chunks are independent requests and run concurrently; results always come
//! back in submission order.

use bytes::Bytes;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use busbar_parse_client::security::url;
use busbar_parse_client::{
    Error, ErrorKind, RequestMethod, RequestOptions, Result, ServerErrorPayload,
};

use crate::coding::{self, ResolvedChildren};
use crate::command::{Command, CommandBody};
use crate::executor::CommandExecutor;

#[derive(Debug, Serialize)]
struct BatchMember {
    method: RequestMethod,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
}

#[derive(Debug, Serialize)]
struct BatchEnvelope {
    requests: Vec<BatchMember>,
    transaction: bool,
}

/// One entry of a batch response.
#[derive(Debug, Deserialize)]
struct BatchItem {
    #[serde(default)]
    success: Option<Value>,
    #[serde(default)]
    error: Option<ServerErrorPayload>,
}

impl CommandExecutor {
    /// Execute commands as batch requests of at most `limit` members.
    ///
    /// Returns one result per command, in order. A failed member fails only
    /// its own slot; a failed chunk fails every slot in it. With
    /// `transaction`, all commands must fit in one chunk and any failure is
    /// returned as the overall error.
    #[instrument(skip(self, commands, options, resolved), fields(count = commands.len()))]
    pub async fn execute_batch<R: Send + 'static>(
        &self,
        commands: &[Command<R>],
        transaction: bool,
        limit: usize,
        options: &RequestOptions,
        resolved: &ResolvedChildren,
    ) -> Result<Vec<Result<R>>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.max(1);
        if transaction && commands.len() > limit {
            return Err(Error::new(ErrorKind::BatchTooLarge {
                size: commands.len(),
                limit,
            }));
        }

        let chunks: Vec<&[Command<R>]> = commands.chunks(limit).collect();
        let envelopes = chunks
            .iter()
            .map(|chunk| self.envelope(chunk, transaction, resolved))
            .collect::<Result<Vec<_>>>()?;
        debug!(chunks = chunks.len(), "executing batch");

        let outcomes = join_all(
            envelopes
                .into_iter()
                .zip(chunks.iter().copied())
                .map(|(envelope, chunk)| self.execute_chunk(envelope, chunk, options)),
        )
        .await;

        let mut results = Vec::with_capacity(commands.len());
        for (outcome, chunk) in outcomes.into_iter().zip(&chunks) {
            match outcome {
                Ok(items) if transaction => {
                    if let Some(e) = items.iter().find_map(|item| item.as_ref().err()) {
                        return Err(e.replicate());
                    }
                    results.extend(items)
                }
                Ok(items) => results.extend(items),
                Err(e) if transaction => return Err(e),
                Err(e) => results.extend(chunk.iter().map(|_| Err(e.replicate()))),
            }
        }
        Ok(results)
    }

    fn envelope<R>(
        &self,
        chunk: &[Command<R>],
        transaction: bool,
        resolved: &ResolvedChildren,
    ) -> Result<BatchEnvelope> {
        let requests = chunk
            .iter()
            .map(|command| {
                let body = match &command.body {
                    None => None,
                    Some(CommandBody::Json(value)) => Some(value.clone()),
                    Some(CommandBody::Object {
                        fields,
                        keep_object_id,
                    }) => Some(coding::encode_body(fields, resolved, *keep_object_id)?),
                    Some(CommandBody::Bytes(_)) | Some(CommandBody::File(_)) => {
                        return Err(Error::encoding(format!(
                            "{} {} has a raw body and cannot be batched",
                            command.method, command.path
                        )))
                    }
                };
                Ok(BatchMember {
                    method: command.method,
                    path: url::with_query(
                        &self.config().mounted_path(&command.path),
                        &command.params,
                    ),
                    body,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BatchEnvelope {
            requests,
            transaction,
        })
    }

    async fn execute_chunk<R: Send + 'static>(
        &self,
        envelope: BatchEnvelope,
        chunk: &[Command<R>],
        options: &RequestOptions,
    ) -> Result<Vec<Result<R>>> {
        let transaction = envelope.transaction;
        let command =
            Command::<Vec<BatchItem>>::json(RequestMethod::Post, "/batch").json_body(&envelope)?;
        let items = self
            .execute(&command, options, &ResolvedChildren::new())
            .await?;
        if items.len() != chunk.len() {
            debug!(
                expected = chunk.len(),
                received = items.len(),
                "batch response length mismatch"
            );
            if transaction {
                return Err(Error::decoding(format!(
                    "transactional batch of {} members got {} results",
                    chunk.len(),
                    items.len()
                )));
            }
        }

        let mut items = items.into_iter();
        let mut results = Vec::with_capacity(chunk.len());
        for (index, member) in chunk.iter().enumerate() {
            let result = match items.next() {
                Some(BatchItem {
                    error: Some(payload),
                    ..
                }) => Err(Error::from_payload(payload)),
                Some(BatchItem { success, .. }) => {
                    let value = success.unwrap_or(Value::Null);
                    match serde_json::to_vec(&value) {
                        Ok(bytes) => member.decode(Bytes::from(bytes)).await,
                        Err(e) => Err(e.into()),
                    }
                }
                None => Err(Error::decoding(format!(
                    "batch response has no entry for member {}",
                    index
                ))),
            };
            results.push(result);
        }
        Ok(results)
    }
}
