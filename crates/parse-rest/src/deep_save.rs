//! Deep-save: persist every unsaved object and file reachable from a root
//! before the root itself.
//!
//! Children are saved in waves. Files are always ready; an object is ready
//! once everything it references has been resolved. A wave with nothing
//! ready means the remaining objects reference each other, which is
//! reported as a cycle before any request is sent for them.

use std::collections::{HashSet, VecDeque};

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use busbar_parse_client::{Error, ErrorKind, RequestMethod, RequestOptions, Result};

use crate::coding::{self, ResolvedChildren, SavedFile};
use crate::command::{Command, CommandBody};
use crate::executor::CommandExecutor;
use crate::graph::ObjectGraph;
use crate::link::LocalId;
use crate::object;
use crate::types::Pointer;

/// Unsaved work found by walking the graph from a root.
#[derive(Debug, Default)]
struct Pending {
    objects: Vec<LocalId>,
    files: Vec<Uuid>,
}

impl Pending {
    fn len(&self) -> usize {
        self.objects.len() + self.files.len()
    }

    fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.files.is_empty()
    }
}

impl CommandExecutor {
    /// Save the unsaved children of `root` and return their resolutions.
    ///
    /// `root` is the canonical map of the object about to be saved. Saved
    /// children are recorded in `graph`. With `transaction`, unsaved children
    /// are an error: they must be saved before the transactional call.
    #[instrument(skip(self, graph, root, options))]
    pub async fn save_children(
        &self,
        graph: &mut ObjectGraph,
        root: &Map<String, Value>,
        options: &RequestOptions,
        transaction: bool,
    ) -> Result<ResolvedChildren> {
        let mut resolved = ResolvedChildren::new();
        let mut pending = discover(graph, root, &mut resolved)?;
        if pending.is_empty() {
            return Ok(resolved);
        }
        if transaction {
            return Err(Error::new(ErrorKind::UnsavedChildrenInTransaction {
                count: pending.len(),
            }));
        }

        let mut wave = 0usize;
        while !pending.is_empty() {
            wave += 1;
            let files = std::mem::take(&mut pending.files);
            let (ready, deferred): (Vec<LocalId>, Vec<LocalId>) =
                std::mem::take(&mut pending.objects)
                    .into_iter()
                    .partition(|id| match graph.node(id) {
                        Some(node) => coding::collect_unresolved(&node.fields, &resolved).is_empty(),
                        None => false,
                    });

            if ready.is_empty() && files.is_empty() {
                let classes: Vec<&str> = deferred
                    .iter()
                    .filter_map(|id| graph.node(id))
                    .map(|node| node.class_name.as_str())
                    .collect();
                return Err(Error::new(ErrorKind::CircularDependency(format!(
                    "{} unsaved object(s) reference each other: {}",
                    deferred.len(),
                    classes.join(", ")
                ))));
            }

            debug!(wave, files = files.len(), objects = ready.len(), "saving deep-save wave");
            self.save_files(graph, &files, options, &mut resolved).await?;
            self.save_objects(graph, &ready, options, &mut resolved).await?;
            pending.objects = deferred;
        }
        Ok(resolved)
    }

    async fn save_files(
        &self,
        graph: &mut ObjectGraph,
        files: &[Uuid],
        options: &RequestOptions,
        resolved: &mut ResolvedChildren,
    ) -> Result<()> {
        let uploads = files
            .iter()
            .map(|id| {
                let file = graph
                    .file(id)
                    .ok_or_else(|| Error::encoding(format!("file {} is not in the object graph", id)))?;
                Ok((*id, file.upload_command()?, file.upload_options(options)))
            })
            .collect::<Result<Vec<_>>>()?;

        let nothing = ResolvedChildren::new();
        let saved = join_all(
            uploads
                .iter()
                .map(|(_, command, options)| self.execute(command, options, &nothing)),
        )
        .await;

        for ((id, _, _), result) in uploads.iter().zip(saved) {
            let file: SavedFile = result?;
            graph.mark_file_saved(id, &file);
            resolved.files.insert(*id, file);
        }
        Ok(())
    }

    async fn save_objects(
        &self,
        graph: &mut ObjectGraph,
        ready: &[LocalId],
        options: &RequestOptions,
        resolved: &mut ResolvedChildren,
    ) -> Result<()> {
        if ready.is_empty() {
            return Ok(());
        }
        let mut commands = Vec::with_capacity(ready.len());
        let mut classes = Vec::with_capacity(ready.len());
        for id in ready {
            let node = graph
                .node(id)
                .ok_or_else(|| Error::encoding(format!("object {} is not in the object graph", id)))?;
            commands.push(
                Command::<Map<String, Value>>::json(
                    RequestMethod::Post,
                    object::endpoint(&node.class_name, None),
                )
                .body(CommandBody::Object {
                    fields: node.fields.clone(),
                    keep_object_id: false,
                }),
            );
            classes.push(node.class_name.clone());
        }

        let results = self
            .execute_batch(&commands, false, self.config().batch_limit, options, resolved)
            .await?;

        for ((id, class_name), result) in ready.iter().zip(classes).zip(results) {
            let (response, _) = coding::server_fields(result?);
            let object_id = response
                .get("objectId")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::decoding(format!("create response for {} has no objectId", class_name)))?;
            let pointer = Pointer::new(class_name, object_id);

            let mut fields = match graph.node(id) {
                Some(node) => coding::resolve_links(&node.fields, resolved),
                None => Map::new(),
            };
            fields.extend(response);
            graph.mark_saved(id, pointer.clone(), fields);
            resolved.objects.insert(*id, pointer);
        }
        Ok(())
    }
}

/// Walk everything reachable from `root`. Children that are already saved go
/// straight into `resolved`; the rest are returned in discovery order.
fn discover(
    graph: &ObjectGraph,
    root: &Map<String, Value>,
    resolved: &mut ResolvedChildren,
) -> Result<Pending> {
    let mut pending = Pending::default();
    let mut seen_objects = HashSet::new();
    let mut seen_files = HashSet::new();
    let mut queue = VecDeque::new();
    let nothing = ResolvedChildren::new();

    let mut visit = |fields: &Map<String, Value>,
                     queue: &mut VecDeque<LocalId>,
                     pending: &mut Pending,
                     resolved: &mut ResolvedChildren|
     -> Result<()> {
        let found = coding::collect_unresolved(fields, &nothing);
        for id in found.objects {
            if seen_objects.insert(id) {
                queue.push_back(id);
            }
        }
        for id in found.files {
            if !seen_files.insert(id) {
                continue;
            }
            let file = graph
                .file(&id)
                .ok_or_else(|| Error::encoding(format!("file {} is not in the object graph", id)))?;
            match &file.url {
                Some(url) => {
                    resolved.files.insert(
                        id,
                        SavedFile {
                            name: file.name.clone(),
                            url: url.clone(),
                        },
                    );
                }
                None => pending.files.push(id),
            }
        }
        Ok(())
    };

    visit(root, &mut queue, &mut pending, resolved)?;
    while let Some(id) = queue.pop_front() {
        let node = graph
            .node(&id)
            .ok_or_else(|| Error::encoding(format!("object {} is not in the object graph", id)))?;
        match &node.saved {
            Some(pointer) => {
                resolved.objects.insert(id, pointer.clone());
            }
            None => {
                pending.objects.push(id);
                visit(&node.fields, &mut queue, &mut pending, resolved)?;
            }
        }
    }
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use busbar_parse_client::testing::MockExecutor;
    use busbar_parse_client::{HttpRequest, HttpResponse, ServerConfig};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use crate::file::ParseFile;
    use crate::identity::SessionContext;
    use crate::link::Link;
    use crate::object::{ObjectMeta, ParseObject};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Tag {
        #[serde(flatten)]
        meta: ObjectMeta,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<Link<Tag>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<ParseFile>,
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

    fn tag(name: &str, parent: Option<Link<Tag>>) -> Tag {
        Tag {
            name: name.to_string(),
            parent,
            ..Tag::default()
        }
    }

    fn executor(mock: &MockExecutor) -> CommandExecutor {
        let config = ServerConfig::builder("http://localhost:1337/parse", "app")
            .build()
            .unwrap();
        CommandExecutor::new(
            Arc::new(config),
            Arc::new(mock.clone()),
            Arc::new(SessionContext::in_memory()),
        )
    }

    /// Assigns sequential ids to batch members and names to uploaded files.
    fn server(counter: Arc<AtomicUsize>) -> impl Fn(&HttpRequest) -> busbar_parse_client::Result<HttpResponse> {
        move |request| {
            if request.url.contains("/files/") {
                let name = request.url.rsplit('/').next().unwrap_or_default();
                return Ok(HttpResponse::json(&json!({
                    "name": format!("saved_{}", name),
                    "url": format!("http://files/saved_{}", name)
                })));
            }
            let body: Value = serde_json::from_slice(request.body_bytes().unwrap()).unwrap();
            let items: Vec<Value> = body["requests"]
                .as_array()
                .unwrap()
                .iter()
                .map(|_| {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    json!({"success": {"objectId": format!("id{}", n), "createdAt": "2024-01-01T00:00:00.000Z"}})
                })
                .collect();
            Ok(HttpResponse::json(&Value::Array(items)))
        }
    }

    fn root_with(link: Link<Tag>) -> Map<String, Value> {
        coding::to_map(&tag("root", Some(link))).unwrap()
    }

    #[tokio::test]
    async fn test_child_saved_before_parent_payload() {
        let mock = MockExecutor::with_responder(server(Arc::new(AtomicUsize::new(0))));
        let executor = executor(&mock);
        let mut graph = ObjectGraph::new();
        let child = graph.insert(tag("x", None)).unwrap();
        let root = root_with(child.clone());

        let resolved = executor
            .save_children(&mut graph, &root, &RequestOptions::new(), false)
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 1);
        let pointer = Pointer::new("Tag", "id0");
        assert_eq!(graph.pointer(&child), Some(pointer.clone()));
        let body = coding::encode_body(&root, &resolved, false).unwrap();
        assert_eq!(body["parent"], pointer.to_value());
        assert_eq!(
            graph.get(&child).unwrap().unwrap().meta.object_id.as_deref(),
            Some("id0")
        );
    }

    #[tokio::test]
    async fn test_saved_child_is_reconciled_like_a_root() {
        let mock = MockExecutor::new();
        mock.queue_json(json!([{"success": {
            "objectId": "u1",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "sessionToken": "r:child"
        }}]));
        let executor = executor(&mock);
        let mut graph = ObjectGraph::new();
        let child = graph.insert(tag("x", None)).unwrap();

        executor
            .save_children(&mut graph, &root_with(child.clone()), &RequestOptions::new(), false)
            .await
            .unwrap();

        let saved = graph.get(&child).unwrap().unwrap();
        assert!(saved.meta.updated_at.is_some());
        assert_eq!(saved.meta.updated_at, saved.meta.created_at);
        let local_id = child.local_id().unwrap();
        assert!(!graph.node(&local_id).unwrap().fields.contains_key("sessionToken"));
    }

    #[tokio::test]
    async fn test_waves_follow_depth_and_save_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mock = MockExecutor::with_responder(server(counter.clone()));
        let executor = executor(&mock);

        // Depth 3 with a shared leaf: a -> b -> leaf, a -> c -> leaf.
        let mut graph = ObjectGraph::new();
        let leaf = graph.insert(tag("leaf", None)).unwrap();
        let b = graph.insert(tag("b", Some(leaf.clone()))).unwrap();
        let c = graph.insert(tag("c", Some(leaf.clone()))).unwrap();
        let a = graph.insert(tag("a", Some(b.clone()))).unwrap();
        let root = coding::to_map(&json!({
            "first": a,
            "second": c,
            "again": [leaf.clone(), b.clone()]
        }))
        .unwrap();

        executor
            .save_children(&mut graph, &root, &RequestOptions::new(), false)
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        for link in [&leaf, &b, &c, &a] {
            assert!(graph.pointer(link).is_some());
        }
    }

    #[tokio::test]
    async fn test_cycle_is_rejected_without_requests() {
        let mock = MockExecutor::with_responder(server(Arc::new(AtomicUsize::new(0))));
        let executor = executor(&mock);
        let mut graph = ObjectGraph::new();
        let a = graph.insert(tag("a", None)).unwrap();
        let b = graph.insert(tag("b", Some(a.clone()))).unwrap();
        graph.replace(&a, &tag("a", Some(b))).unwrap();

        let err = executor
            .save_children(&mut graph, &root_with(a), &RequestOptions::new(), false)
            .await
            .unwrap_err();

        assert!(matches!(err.kind, ErrorKind::CircularDependency(ref m) if m.contains("Tag")));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transaction_rejects_unsaved_children() {
        let mock = MockExecutor::with_responder(server(Arc::new(AtomicUsize::new(0))));
        let executor = executor(&mock);
        let mut graph = ObjectGraph::new();
        let child = graph.insert(tag("x", None)).unwrap();

        let err = executor
            .save_children(&mut graph, &root_with(child), &RequestOptions::new(), true)
            .await
            .unwrap_err();

        assert!(matches!(err.kind, ErrorKind::UnsavedChildrenInTransaction { count: 1 }));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_saved_children_need_no_requests() {
        let mock = MockExecutor::new();
        let executor = executor(&mock);
        let mut graph = ObjectGraph::new();

        let resolved = executor
            .save_children(
                &mut graph,
                &root_with(Link::saved("t1")),
                &RequestOptions::new(),
                true,
            )
            .await
            .unwrap();
        assert!(resolved.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_files_upload_before_their_owner() {
        let mock = MockExecutor::with_responder(server(Arc::new(AtomicUsize::new(0))));
        let executor = executor(&mock);
        let mut graph = ObjectGraph::new();
        let icon = graph.insert_file(ParseFile::from_bytes("icon.png", "png"));
        let child = graph
            .insert(Tag {
                icon: Some(icon.clone()),
                ..tag("x", None)
            })
            .unwrap();

        executor
            .save_children(&mut graph, &root_with(child.clone()), &RequestOptions::new(), false)
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].url.ends_with("/files/icon.png"));
        assert_eq!(requests[0].header_value("Content-Type"), Some("image/png"));
        assert!(requests[1].url.ends_with("/batch"));
        let batch: Value = serde_json::from_slice(requests[1].body_bytes().unwrap()).unwrap();
        assert_eq!(
            batch["requests"][0]["body"]["icon"],
            json!({"__type": "File", "name": "saved_icon.png", "url": "http://files/saved_icon.png"})
        );
        assert!(graph.file(&icon.local_id).unwrap().is_saved());
    }

    #[tokio::test]
    async fn test_unregistered_file_is_an_encoding_error() {
        let mock = MockExecutor::new();
        let executor = executor(&mock);
        let mut graph = ObjectGraph::new();
        let root = coding::to_map(&Tag {
            icon: Some(ParseFile::from_bytes("a.txt", "x")),
            ..tag("root", None)
        })
        .unwrap();

        let err = executor
            .save_children(&mut graph, &root, &RequestOptions::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Encoding(_)));
    }

    #[tokio::test]
    async fn test_child_failure_aborts() {
        let mock = MockExecutor::new();
        mock.queue_json(json!([{"error": {"code": 142, "error": "validation failed"}}]));
        let executor = executor(&mock);
        let mut graph = ObjectGraph::new();
        let child = graph.insert(tag("x", None)).unwrap();

        let err = executor
            .save_children(&mut graph, &root_with(child.clone()), &RequestOptions::new(), false)
            .await
            .unwrap_err();
        assert_eq!(err.server_code(), Some(142));
        assert!(graph.pointer(&child).is_none());
    }
}
