//! Arena for unsaved objects and files.
//!
//! Objects reference each other through [`Link`]s holding a [`LocalId`],
//! never through owning references, so cyclic graphs can be built and are
//! rejected by deep-save instead of recursing forever.

use std::collections::HashMap;

use serde_json::{Map, Value};
use uuid::Uuid;

use busbar_parse_client::{Error, Result};

use crate::coding::{self, SavedFile};
use crate::file::ParseFile;
use crate::link::{Link, LinkTarget, LocalId};
use crate::object::ParseObject;
use crate::types::Pointer;

#[derive(Debug, Clone)]
pub(crate) struct GraphNode {
    pub class_name: String,
    /// Canonical fields, including `objectId`/`createdAt` once saved.
    pub fields: Map<String, Value>,
    pub saved: Option<Pointer>,
}

/// Holds unsaved objects and files for deep-save.
///
/// ```rust,ignore
/// let mut graph = ObjectGraph::new();
/// let tag = graph.insert(Tag { name: "x".into(), ..Default::default() })?;
/// let mut note = Note { title: "a".into(), tag: Some(tag.clone()), ..Default::default() };
/// client.save_graph(&mut note, &mut graph, &RequestOptions::new()).await?;
/// assert!(graph.pointer(&tag).is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    objects: HashMap<LocalId, GraphNode>,
    files: HashMap<Uuid, ParseFile>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object and get a link to it.
    ///
    /// Objects that already have an id are not stored; the link is a plain
    /// pointer.
    pub fn insert<T: ParseObject>(&mut self, object: T) -> Result<Link<T>> {
        if object.object_id().is_some() {
            return Link::to(&object);
        }
        let local_id = LocalId::new();
        self.objects.insert(
            local_id,
            GraphNode {
                class_name: T::CLASS_NAME.to_string(),
                fields: coding::to_map(&object)?,
                saved: None,
            },
        );
        Ok(Link::unsaved(local_id))
    }

    /// Replace the object behind an unsaved link, e.g. to close a reference
    /// loop after both ends exist.
    pub fn replace<T: ParseObject>(&mut self, link: &Link<T>, object: &T) -> Result<()> {
        let local_id = link
            .local_id()
            .ok_or_else(|| Error::encoding("cannot replace a saved link in an object graph"))?;
        let node = self
            .objects
            .get_mut(&local_id)
            .ok_or_else(|| Error::encoding(format!("object {} is not in the graph", local_id)))?;
        node.fields = coding::to_map(object)?;
        Ok(())
    }

    /// The object behind a link, if the graph holds it.
    pub fn get<T: ParseObject>(&self, link: &Link<T>) -> Result<Option<T>> {
        let node = match link.target() {
            LinkTarget::Unsaved(local_id) => self.objects.get(local_id),
            LinkTarget::Saved(pointer) => self
                .objects
                .values()
                .find(|node| node.saved.as_ref() == Some(pointer)),
        };
        match node {
            Some(node) => coding::from_map(node.fields.clone()).map(Some),
            None => Ok(None),
        }
    }

    /// The server pointer for a link, once its target has been saved.
    pub fn pointer<T>(&self, link: &Link<T>) -> Option<Pointer> {
        match link.target() {
            LinkTarget::Saved(pointer) => Some(pointer.clone()),
            LinkTarget::Unsaved(local_id) => self.objects.get(local_id)?.saved.clone(),
        }
    }

    /// Register a file for upload by deep-save.
    ///
    /// Returns the file to embed in object fields.
    pub fn insert_file(&mut self, file: ParseFile) -> ParseFile {
        let embedded = file.clone();
        if !file.is_saved() {
            self.files.insert(file.local_id, file);
        }
        embedded
    }

    /// The registered file with this local id, saved or not.
    pub fn file(&self, local_id: &Uuid) -> Option<&ParseFile> {
        self.files.get(local_id)
    }

    /// Number of objects held.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.files.is_empty()
    }

    pub(crate) fn node(&self, local_id: &LocalId) -> Option<&GraphNode> {
        self.objects.get(local_id)
    }

    /// Record a successful save: the node's fields become `fields`, which
    /// carry the server-assigned id and timestamps.
    pub(crate) fn mark_saved(
        &mut self,
        local_id: &LocalId,
        pointer: Pointer,
        fields: Map<String, Value>,
    ) {
        if let Some(node) = self.objects.get_mut(local_id) {
            node.fields = fields;
            node.saved = Some(pointer);
        }
    }

    pub(crate) fn mark_file_saved(&mut self, local_id: &Uuid, saved: &SavedFile) {
        if let Some(file) = self.files.get_mut(local_id) {
            file.name = saved.name.clone();
            file.url = Some(saved.url.clone());
        }
    }
}
