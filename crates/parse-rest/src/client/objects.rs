//! Object persistence: save, create, replace, update, fetch, delete and
//! their batch forms.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::instrument;

use busbar_parse_client::{Error, ErrorKind, RequestMethod, RequestOptions, Result};

use crate::coding::{self, server_fields, ResolvedChildren};
use crate::command::{Command, CommandBody};
use crate::graph::ObjectGraph;
use crate::identity::{SessionContext, SlotKind};
use crate::link::Link;
use crate::object::{self, ParseObject};
use crate::query::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Create when new, otherwise replace.
    Save,
    Create,
    Replace,
    Update,
}

#[derive(Debug)]
struct WriteTarget {
    method: RequestMethod,
    path: String,
    keep_object_id: bool,
}

fn require_id<T: ParseObject>(object: &T) -> Result<&str> {
    object
        .object_id()
        .ok_or_else(|| Error::missing_identifier(format!("{} has no objectId", T::CLASS_NAME)))
}

/// A command whose response is merged over `base` to produce the updated
/// object. The matching identity slot is refreshed as part of decoding.
pub(crate) fn reconciling_command<T: ParseObject>(
    session: &Arc<SessionContext>,
    method: RequestMethod,
    path: String,
    base: Map<String, Value>,
) -> Command<T> {
    let session = Arc::clone(session);
    let base = Arc::new(base);
    Command::new(method, path, move |bytes: Bytes| {
        let session = Arc::clone(&session);
        let base = Arc::clone(&base);
        async move {
            let response: Map<String, Value> = serde_json::from_slice(&bytes)?;
            let (fields, token) = server_fields(response);
            let mut merged = (*base).clone();
            merged.extend(fields);
            super::sync_identity(&session, T::CLASS_NAME, &merged, token).await;
            coding::from_map(merged)
        }
    })
}

impl super::ParseClient {
    /// Save an object: create it when new, otherwise replace it.
    ///
    /// Unsaved children must be registered in a graph; use
    /// [`save_graph`](Self::save_graph) for those.
    #[instrument(skip(self, object, options), fields(class = T::CLASS_NAME))]
    pub async fn save<T: ParseObject>(&self, object: &mut T, options: &RequestOptions) -> Result<()> {
        self.write(object, &mut ObjectGraph::new(), WriteMode::Save, options)
            .await
    }

    /// Save an object after deep-saving every unsaved child it reaches
    /// through `graph`.
    #[instrument(skip(self, object, graph, options), fields(class = T::CLASS_NAME))]
    pub async fn save_graph<T: ParseObject>(
        &self,
        object: &mut T,
        graph: &mut ObjectGraph,
        options: &RequestOptions,
    ) -> Result<()> {
        self.write(object, graph, WriteMode::Save, options).await
    }

    /// Create an object with `POST`.
    #[instrument(skip(self, object, options), fields(class = T::CLASS_NAME))]
    pub async fn create<T: ParseObject>(&self, object: &mut T, options: &RequestOptions) -> Result<()> {
        self.write(object, &mut ObjectGraph::new(), WriteMode::Create, options)
            .await
    }

    /// Replace an object with `PUT`.
    #[instrument(skip(self, object, options), fields(class = T::CLASS_NAME))]
    pub async fn replace<T: ParseObject>(&self, object: &mut T, options: &RequestOptions) -> Result<()> {
        self.write(object, &mut ObjectGraph::new(), WriteMode::Replace, options)
            .await
    }

    /// Update an object with `PATCH`.
    #[instrument(skip(self, object, options), fields(class = T::CLASS_NAME))]
    pub async fn update<T: ParseObject>(&self, object: &mut T, options: &RequestOptions) -> Result<()> {
        self.write(object, &mut ObjectGraph::new(), WriteMode::Update, options)
            .await
    }

    /// Refresh an object from the server.
    pub async fn fetch<T: ParseObject>(&self, object: &mut T, options: &RequestOptions) -> Result<()> {
        self.fetch_include(object, &[], options).await
    }

    /// Refresh an object, expanding the given pointer fields.
    #[instrument(skip(self, object, options), fields(class = T::CLASS_NAME))]
    pub async fn fetch_include<T: ParseObject>(
        &self,
        object: &mut T,
        include: &[&str],
        options: &RequestOptions,
    ) -> Result<()> {
        let path = object::endpoint(T::CLASS_NAME, Some(require_id(&*object)?));
        let base = coding::to_map(&*object)?;
        let mut command = reconciling_command::<T>(self.session(), RequestMethod::Get, path, base);
        if !include.is_empty() {
            command = command.param("include", include.join(","));
        }
        *object = self.execute(&command, options).await?;
        Ok(())
    }

    /// Load an object by id.
    #[instrument(skip(self, options), fields(class = T::CLASS_NAME))]
    pub async fn get<T: ParseObject>(&self, object_id: &str, options: &RequestOptions) -> Result<T> {
        let command = reconciling_command::<T>(
            self.session(),
            RequestMethod::Get,
            object::endpoint(T::CLASS_NAME, Some(object_id)),
            Map::new(),
        );
        self.execute(&command, options).await
    }

    /// Load the object a saved link points to.
    pub async fn fetch_link<T: ParseObject>(
        &self,
        link: &Link<T>,
        options: &RequestOptions,
    ) -> Result<T> {
        let object_id = link.object_id().ok_or_else(|| {
            Error::missing_identifier(format!("link to an unsaved {}", T::CLASS_NAME))
        })?;
        self.get(object_id, options).await
    }

    /// Delete an object. Deleting the current user or installation clears it.
    #[instrument(skip(self, object, options), fields(class = T::CLASS_NAME))]
    pub async fn delete<T: ParseObject>(&self, object: &T, options: &RequestOptions) -> Result<()> {
        let object_id = require_id(object)?;
        let command = Command::<Value>::json(
            RequestMethod::Delete,
            object::endpoint(T::CLASS_NAME, Some(object_id)),
        );
        self.execute(&command, options).await?;
        self.forget_identity(T::CLASS_NAME, object_id).await;
        Ok(())
    }

    /// Save many objects in batches. See [`save_all_graph`](Self::save_all_graph).
    pub async fn save_all<T: ParseObject>(
        &self,
        objects: &mut [T],
        transaction: bool,
        options: &RequestOptions,
    ) -> Result<Vec<Result<()>>> {
        self.write_all(objects, &mut ObjectGraph::new(), WriteMode::Save, transaction, options)
            .await
    }

    /// Save many objects in batches, deep-saving their children first.
    ///
    /// Returns one result per object, in order; successful objects are
    /// updated in place. With `transaction`, children must already be saved
    /// and all objects must fit in one batch.
    #[instrument(skip(self, objects, graph, options), fields(class = T::CLASS_NAME, count = objects.len()))]
    pub async fn save_all_graph<T: ParseObject>(
        &self,
        objects: &mut [T],
        graph: &mut ObjectGraph,
        transaction: bool,
        options: &RequestOptions,
    ) -> Result<Vec<Result<()>>> {
        self.write_all(objects, graph, WriteMode::Save, transaction, options)
            .await
    }

    /// Create many objects in batches.
    #[instrument(skip(self, objects, options), fields(class = T::CLASS_NAME, count = objects.len()))]
    pub async fn create_all<T: ParseObject>(
        &self,
        objects: &mut [T],
        transaction: bool,
        options: &RequestOptions,
    ) -> Result<Vec<Result<()>>> {
        self.write_all(objects, &mut ObjectGraph::new(), WriteMode::Create, transaction, options)
            .await
    }

    /// Replace many objects in batches.
    #[instrument(skip(self, objects, options), fields(class = T::CLASS_NAME, count = objects.len()))]
    pub async fn replace_all<T: ParseObject>(
        &self,
        objects: &mut [T],
        transaction: bool,
        options: &RequestOptions,
    ) -> Result<Vec<Result<()>>> {
        self.write_all(objects, &mut ObjectGraph::new(), WriteMode::Replace, transaction, options)
            .await
    }

    /// Delete many objects in batches.
    #[instrument(skip(self, objects, options), fields(class = T::CLASS_NAME, count = objects.len()))]
    pub async fn delete_all<T: ParseObject>(
        &self,
        objects: &[T],
        transaction: bool,
        options: &RequestOptions,
    ) -> Result<Vec<Result<()>>> {
        let ids = objects.iter().map(require_id).collect::<Result<Vec<_>>>()?;
        let commands: Vec<Command<()>> = ids
            .iter()
            .map(|id| {
                Command::<Value>::json(
                    RequestMethod::Delete,
                    object::endpoint(T::CLASS_NAME, Some(id)),
                )
                .map(|_| Ok(()))
            })
            .collect();

        let results = self
            .execute_batch(&commands, transaction, options)
            .await?;
        for (id, result) in ids.iter().zip(&results) {
            if result.is_ok() {
                self.forget_identity(T::CLASS_NAME, id).await;
            }
        }
        Ok(results)
    }

    /// Refresh many objects with one query.
    ///
    /// Objects the server no longer has fail with `ObjectNotFound`.
    #[instrument(skip(self, objects, options), fields(class = T::CLASS_NAME, count = objects.len()))]
    pub async fn fetch_all<T: ParseObject>(
        &self,
        objects: &mut [T],
        options: &RequestOptions,
    ) -> Result<Vec<Result<()>>> {
        if objects.is_empty() {
            return Ok(Vec::new());
        }
        let ids = objects
            .iter()
            .map(|o| require_id(o).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        let query = Query::<T>::new().object_ids(&ids).limit(ids.len());
        let found = self.find_maps(&query, options).await?;

        let mut results = Vec::with_capacity(objects.len());
        for (object, id) in objects.iter_mut().zip(&ids) {
            let fields = found
                .iter()
                .find(|f| f.get("objectId").and_then(Value::as_str) == Some(id.as_str()));
            let result = match fields {
                Some(fields) => self.merge_fetched(object, fields.clone()).await,
                None => Err(Error::new(ErrorKind::ObjectNotFound(format!(
                    "{} {}",
                    T::CLASS_NAME,
                    id
                )))),
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn merge_fetched<T: ParseObject>(
        &self,
        object: &mut T,
        response: Map<String, Value>,
    ) -> Result<()> {
        let (fields, token) = server_fields(response);
        let mut merged = coding::to_map(&*object)?;
        merged.extend(fields);
        super::sync_identity(self.session(), T::CLASS_NAME, &merged, token).await;
        *object = coding::from_map(merged)?;
        Ok(())
    }

    async fn write<T: ParseObject>(
        &self,
        object: &mut T,
        graph: &mut ObjectGraph,
        mode: WriteMode,
        options: &RequestOptions,
    ) -> Result<()> {
        let target = self.write_target(&*object, mode)?;
        let canonical = coding::to_map(&*object)?;
        let resolved = self
            .executor
            .save_children(graph, &canonical, options, false)
            .await?;
        let command = self.write_command::<T>(target, canonical, &resolved);
        *object = self.executor.execute(&command, options, &resolved).await?;
        Ok(())
    }

    async fn write_all<T: ParseObject>(
        &self,
        objects: &mut [T],
        graph: &mut ObjectGraph,
        mode: WriteMode,
        transaction: bool,
        options: &RequestOptions,
    ) -> Result<Vec<Result<()>>> {
        let limit = self.config().batch_limit.max(1);
        if transaction && objects.len() > limit {
            return Err(Error::new(ErrorKind::BatchTooLarge {
                size: objects.len(),
                limit,
            }));
        }
        let targets = objects
            .iter()
            .map(|object| self.write_target(object, mode))
            .collect::<Result<Vec<_>>>()?;

        let mut resolved = ResolvedChildren::new();
        let mut canonicals = Vec::with_capacity(objects.len());
        for object in objects.iter() {
            let canonical = coding::to_map(object)?;
            let children = self
                .executor
                .save_children(graph, &canonical, options, transaction)
                .await?;
            resolved.objects.extend(children.objects);
            resolved.files.extend(children.files);
            canonicals.push(canonical);
        }

        let commands: Vec<Command<T>> = targets
            .into_iter()
            .zip(canonicals)
            .map(|(target, canonical)| self.write_command::<T>(target, canonical, &resolved))
            .collect();
        let results = self
            .executor
            .execute_batch(&commands, transaction, limit, options, &resolved)
            .await?;

        Ok(objects
            .iter_mut()
            .zip(results)
            .map(|(object, result)| result.map(|saved| *object = saved))
            .collect())
    }

    fn write_target<T: ParseObject>(&self, object: &T, mode: WriteMode) -> Result<WriteTarget> {
        let custom_ids = self.config().allow_custom_object_id;
        let create = |keep_object_id| WriteTarget {
            method: RequestMethod::Post,
            path: object::endpoint(T::CLASS_NAME, None),
            keep_object_id,
        };
        let target = match (mode, object.object_id()) {
            (WriteMode::Save | WriteMode::Create, None) if custom_ids => {
                return Err(Error::missing_identifier(format!(
                    "{} needs a client-assigned objectId",
                    T::CLASS_NAME
                )))
            }
            (WriteMode::Save | WriteMode::Create, None) => create(false),
            (WriteMode::Create, Some(_)) => create(custom_ids),
            (WriteMode::Save, Some(_)) if custom_ids && object.meta().created_at.is_none() => {
                create(true)
            }
            (WriteMode::Save | WriteMode::Replace, _) => WriteTarget {
                method: RequestMethod::Put,
                path: object::endpoint(T::CLASS_NAME, Some(require_id(object)?)),
                keep_object_id: false,
            },
            (WriteMode::Update, _) => WriteTarget {
                method: RequestMethod::Patch,
                path: object::endpoint(T::CLASS_NAME, Some(require_id(object)?)),
                keep_object_id: false,
            },
        };
        Ok(target)
    }

    fn write_command<T: ParseObject>(
        &self,
        target: WriteTarget,
        canonical: Map<String, Value>,
        resolved: &ResolvedChildren,
    ) -> Command<T> {
        let base = coding::resolve_links(&canonical, resolved);
        reconciling_command::<T>(self.session(), target.method, target.path, base).body(
            CommandBody::Object {
                fields: canonical,
                keep_object_id: target.keep_object_id,
            },
        )
    }

    async fn forget_identity(&self, class_name: &str, object_id: &str) {
        if let Some(kind) = SlotKind::for_class(class_name) {
            self.session().clear_if_matches(kind, object_id).await;
        }
    }
}
