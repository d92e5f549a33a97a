//! Pure mutation dispatch over an in-memory graph of chats.
//!
//! [`Graph::apply`] is shared by the authoritative engine and by mirrors.
//! It works on a serialized copy of the root chat, guided by the
//! reflection table in [`crate::schema`], and commits only when the edited
//! copy decodes back into a [`Chat`]. A failed mutation leaves the graph
//! untouched.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use cs_assets::AssetOperation;
use cs_domain::chat::{validate_chat_id, Chat};
use cs_domain::error::{Error, Result};

use crate::mutation::Mutation;
use crate::reference::Reference;
use crate::schema::{FieldKind, ObjectType};

/// The only top-level collection.
pub const CHATS: &str = "chats";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Traversal
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the table says lives at a position in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Object(ObjectType),
    List(ObjectType),
    Map,
    Leaf,
}

impl From<FieldKind> for Node {
    fn from(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Struct(ty) => Node::Object(ty),
            FieldKind::List(ty) => Node::List(ty),
            FieldKind::Map => Node::Map,
            FieldKind::Scalar | FieldKind::Text => Node::Leaf,
        }
    }
}

const ROOT: Node = Node::Object(ObjectType::Chat);

/// Node kind at `path` according to the table alone.
fn node_at(path: &[String]) -> Option<Node> {
    let mut node = ROOT;
    for segment in path {
        node = match node {
            Node::Object(ty) => ty.field(segment)?.into(),
            Node::List(ty) => Node::Object(ty),
            Node::Map | Node::Leaf => Node::Leaf,
        };
    }
    Some(node)
}

fn element_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

/// Walk `path` from the root. On failure returns the depth of the first
/// segment that did not resolve.
fn walk<'a>(root: &'a Value, path: &[String]) -> std::result::Result<(&'a Value, Node), usize> {
    let mut value = root;
    let mut node = ROOT;
    for (depth, segment) in path.iter().enumerate() {
        (value, node) = match node {
            Node::Object(ty) => {
                let kind = ty.field(segment).ok_or(depth)?;
                (value.get(segment.as_str()).ok_or(depth)?, kind.into())
            }
            Node::List(ty) => {
                let items = value.as_array().ok_or(depth)?;
                let item = items
                    .iter()
                    .find(|item| element_id(item) == Some(segment.as_str()))
                    .ok_or(depth)?;
                (item, Node::Object(ty))
            }
            Node::Map => (value.get(segment.as_str()).ok_or(depth)?, Node::Leaf),
            Node::Leaf => return Err(depth),
        };
    }
    Ok((value, node))
}

fn walk_mut<'a>(
    root: &'a mut Value,
    path: &[String],
) -> std::result::Result<(&'a mut Value, Node), usize> {
    let mut value = root;
    let mut node = ROOT;
    for (depth, segment) in path.iter().enumerate() {
        let current = value;
        (value, node) = match node {
            Node::Object(ty) => {
                let kind = ty.field(segment).ok_or(depth)?;
                let field = current.get_mut(segment.as_str()).ok_or(depth)?;
                (field, kind.into())
            }
            Node::List(ty) => {
                let items = current.as_array_mut().ok_or(depth)?;
                let item = items
                    .iter_mut()
                    .find(|item| element_id(item) == Some(segment.as_str()))
                    .ok_or(depth)?;
                (item, Node::Object(ty))
            }
            Node::Map => (current.get_mut(segment.as_str()).ok_or(depth)?, Node::Leaf),
            Node::Leaf => return Err(depth),
        };
    }
    Ok((value, node))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Graph
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Root chats keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    chats: BTreeMap<String, Chat>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chat loaded from storage. No persistence intent.
    pub fn insert(&mut self, chat: Chat) {
        self.chats.insert(chat.id.clone(), chat);
    }

    /// Drop a chat from memory without deleting it from storage.
    pub fn evict(&mut self, id: &str) -> Option<Chat> {
        self.chats.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Chat> {
        self.chats.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.chats.contains_key(id)
    }

    pub fn chats(&self) -> impl Iterator<Item = &Chat> {
        self.chats.values()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// Serialized value at `reference`. Read only.
    pub fn resolve(&self, reference: &Reference) -> Result<Value> {
        let not_found = || Error::ReferenceNotFound(reference.to_string());
        let root_id = root_id(reference).map_err(|_| not_found())?;
        let chat = self.chats.get(root_id).ok_or_else(not_found)?;
        let doc = serde_json::to_value(chat)?;
        let (value, _) = walk(&doc, reference.path()).map_err(|_| not_found())?;
        Ok(value.clone())
    }

    /// Apply one mutation, returning the persistence intent it implies.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<AssetOperation> {
        let reference = mutation.reference();
        let root = root_id(reference)?;

        match mutation {
            Mutation::Create {
                object_type,
                object,
                ..
            } if reference.is_root() => return self.create_root(root, *object_type, object),
            Mutation::Delete { .. } if reference.is_root() => return self.delete_root(root),
            _ => {}
        }

        let chat = self
            .chats
            .get(root)
            .ok_or_else(|| Error::AssetNotFound(root.to_owned()))?;
        let mut doc = serde_json::to_value(chat)?;

        match mutation {
            Mutation::Create {
                object_type,
                object,
                ..
            } => create_in(&mut doc, reference, *object_type, object)?,
            Mutation::Delete { .. } => delete_in(&mut doc, reference)?,
            Mutation::SetValue { key, value, .. } => {
                let (target, owner) = target_object(&mut doc, reference, key)?;
                let value = match owner.field(key) {
                    Some(FieldKind::Struct(ty)) => ty.canonicalize(value.clone())?,
                    _ => value.clone(),
                };
                target.insert(key.clone(), value);
            }
            Mutation::AppendToString { key, value, .. } => {
                let (target, owner) = target_object(&mut doc, reference, key)?;
                if owner.field(key) != Some(FieldKind::Text) {
                    return Err(Error::InvalidValue(format!(
                        "{reference}: {owner}.{key} is not a string field"
                    )));
                }
                let current = match target.get(key.as_str()) {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => {
                        return Err(Error::InvalidValue(format!(
                            "{reference}: cannot append to {other}"
                        )))
                    }
                };
                target.insert(key.clone(), Value::String(current + value));
            }
        }

        let updated: Chat = serde_json::from_value(doc)
            .map_err(|e| Error::InvalidValue(format!("{reference}: {e}")))?;
        self.chats.insert(root.to_owned(), updated.clone());
        Ok(AssetOperation::Update {
            id: root.to_owned(),
            chat: updated,
        })
    }

    /// Register a new root chat, or replace an existing one.
    pub fn create_root(
        &mut self,
        id: &str,
        object_type: ObjectType,
        payload: &Value,
    ) -> Result<AssetOperation> {
        if object_type != ObjectType::Chat {
            return Err(Error::InvalidValue(format!(
                "root objects must be chat, got {object_type}"
            )));
        }
        let doc = with_id(ObjectType::Chat, payload, id)?;
        let chat: Chat = serde_json::from_value(doc)
            .map_err(|e| Error::InvalidValue(format!("chat {id}: {e}")))?;

        let replaced = self.chats.insert(id.to_owned(), chat.clone()).is_some();
        Ok(if replaced {
            AssetOperation::Update {
                id: id.to_owned(),
                chat,
            }
        } else {
            AssetOperation::Create(chat)
        })
    }

    pub fn delete_root(&mut self, id: &str) -> Result<AssetOperation> {
        self.chats
            .remove(id)
            .ok_or_else(|| Error::AssetNotFound(id.to_owned()))?;
        Ok(AssetOperation::Delete { id: id.to_owned() })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-variant edits on the serialized root
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn root_id(reference: &Reference) -> Result<&str> {
    match (reference.collection(), reference.root_id()) {
        (Some(CHATS), Some(id)) => {
            validate_chat_id(id)?;
            Ok(id)
        }
        _ => Err(Error::CollectionNotFound(reference.to_string())),
    }
}

/// Payload with any embedded `id` replaced by the reference's, in
/// canonical form.
fn with_id(ty: ObjectType, payload: &Value, id: &str) -> Result<Value> {
    let Value::Object(fields) = payload else {
        return Err(Error::InvalidValue(format!("{ty} payload must be an object")));
    };
    let mut fields = fields.clone();
    fields.remove("id");
    if ty.has_id() {
        fields.insert("id".into(), Value::String(id.to_owned()));
    }
    ty.canonicalize(Value::Object(fields))
}

fn split_leaf(reference: &Reference) -> (&[String], &str) {
    let path = reference.path();
    match path.split_last() {
        Some((leaf, parent)) => (parent, leaf.as_str()),
        None => (path, ""),
    }
}

fn create_in(
    doc: &mut Value,
    reference: &Reference,
    ty: ObjectType,
    payload: &Value,
) -> Result<()> {
    let (parent_path, leaf) = split_leaf(reference);
    let (parent, node) = walk_mut(doc, parent_path)
        .map_err(|_| Error::CollectionNotFound(reference.parent().to_string()))?;

    match node {
        Node::List(expected) if expected == ty => {
            let item = with_id(ty, payload, leaf)?;
            parent
                .as_array_mut()
                .ok_or_else(|| Error::InvalidValue(reference.parent().to_string()))?
                .push(item);
        }
        Node::Map => {
            let mut payload = payload.clone();
            if let Value::Object(fields) = &mut payload {
                fields.remove("id");
            }
            parent
                .as_object_mut()
                .ok_or_else(|| Error::InvalidValue(reference.parent().to_string()))?
                .insert(leaf.to_owned(), payload);
        }
        Node::Object(owner) => match owner.field(leaf) {
            Some(FieldKind::Struct(slot)) if slot == ty => {
                let item = with_id(ty, payload, leaf)?;
                parent
                    .as_object_mut()
                    .ok_or_else(|| Error::InvalidValue(reference.parent().to_string()))?
                    .insert(leaf.to_owned(), item);
            }
            _ => {
                return Err(Error::InvalidValue(format!(
                    "{reference}: {owner}.{leaf} cannot hold a {ty}"
                )))
            }
        },
        Node::List(expected) => {
            return Err(Error::InvalidValue(format!(
                "{reference}: expected {expected}, got {ty}"
            )))
        }
        Node::Leaf => return Err(Error::CollectionNotFound(reference.parent().to_string())),
    }
    Ok(())
}

fn delete_in(doc: &mut Value, reference: &Reference) -> Result<()> {
    let (parent_path, leaf) = split_leaf(reference);
    let (parent, node) = walk_mut(doc, parent_path)
        .map_err(|_| Error::CollectionNotFound(reference.parent().to_string()))?;
    let missing = || Error::ObjectNotFound(reference.to_string());

    match node {
        Node::List(_) => {
            let items = parent.as_array_mut().ok_or_else(missing)?;
            let position = items
                .iter()
                .position(|item| element_id(item) == Some(leaf))
                .ok_or_else(missing)?;
            items.remove(position);
        }
        Node::Map => {
            parent
                .as_object_mut()
                .and_then(|map| map.remove(leaf))
                .ok_or_else(missing)?;
        }
        Node::Object(owner) => {
            return Err(Error::InvalidValue(format!(
                "{reference}: fields of {owner} cannot be deleted"
            )))
        }
        Node::Leaf => return Err(Error::CollectionNotFound(reference.parent().to_string())),
    }
    Ok(())
}

/// Object whose field `key` a SetValue/AppendToString writes.
///
/// `ref` either names the object itself or, when its final segment equals
/// `key`, the field on it.
fn target_object<'a>(
    doc: &'a mut Value,
    reference: &Reference,
    key: &str,
) -> Result<(&'a mut Map<String, Value>, ObjectType)> {
    let full = reference.path();
    let path = match full.split_last() {
        Some((last, parent)) if last == key && node_at(full) == Some(Node::Leaf) => parent,
        _ => full,
    };

    let (value, node) = walk_mut(doc, path).map_err(|depth| {
        if depth + 1 >= path.len() {
            Error::ObjectNotFound(reference.to_string())
        } else {
            Error::CollectionNotFound(reference.parent().to_string())
        }
    })?;

    let Node::Object(owner) = node else {
        return Err(Error::InvalidValue(format!("{reference} is not an object")));
    };
    if key == "id" {
        return Err(Error::InvalidValue(format!("{reference}: id is immutable")));
    }
    if owner.field(key).is_none() {
        return Err(Error::InvalidValue(format!("{reference}: {owner} has no field {key}")));
    }
    let fields = value
        .as_object_mut()
        .ok_or_else(|| Error::InvalidValue(format!("{reference} is not an object")))?;
    Ok((fields, owner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph_with_chat() -> Graph {
        let mut graph = Graph::new();
        graph.insert(Chat::empty("c1"));
        graph
    }

    fn groups() -> Reference {
        Reference::chat("c1").child("message_groups")
    }

    fn create_group(graph: &mut Graph, id: &str) {
        graph
            .apply(&Mutation::create(
                groups().child(id),
                ObjectType::MessageGroup,
                json!({"agent_id": "director", "id": "ignored"}),
            ))
            .unwrap();
    }

    #[test]
    fn root_ids_that_escape_the_store_are_refused() {
        let mut graph = Graph::new();
        for id in ["../../etc/x", "a/b", ""] {
            let err = graph
                .apply(&Mutation::create(
                    Reference::chat(id),
                    ObjectType::Chat,
                    json!({}),
                ))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidValue(_)), "{id:?}: {err}");
        }
        let err = graph
            .apply(&Mutation::set_value(Reference::chat(".."), "title", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
        assert!(graph.is_empty());
    }

    #[test]
    fn field_addressed_set_value_updates_title() {
        let mut graph = graph_with_chat();
        let op = graph
            .apply(&Mutation::set_value(
                "/chats/c1/title".parse().unwrap(),
                "title",
                "Hi",
            ))
            .unwrap();
        assert_eq!(graph.get("c1").unwrap().title, "Hi");
        assert!(matches!(op, AssetOperation::Update { ref id, .. } if id == "c1"));
    }

    #[test]
    fn object_addressed_set_value() {
        let mut graph = graph_with_chat();
        graph
            .apply(&Mutation::set_value(Reference::chat("c1"), "title_edited", true))
            .unwrap();
        assert!(graph.get("c1").unwrap().title_edited);
    }

    #[test]
    fn create_takes_id_from_reference() {
        let mut graph = graph_with_chat();
        create_group(&mut graph, "g1");
        let chat = graph.get("c1").unwrap();
        assert_eq!(chat.message_groups.len(), 1);
        assert_eq!(chat.message_groups[0].id, "g1");
        assert_eq!(chat.message_groups[0].agent_id, "director");
        assert_eq!(
            graph.resolve(&Reference::message_group("c1", "g1")).unwrap()["agent_id"],
            "director"
        );
    }

    #[test]
    fn appends_concatenate_onto_absent_field() {
        let mut graph = graph_with_chat();
        create_group(&mut graph, "g1");
        graph
            .apply(&Mutation::create(
                Reference::message("c1", "g1", "m1"),
                ObjectType::Message,
                json!({}),
            ))
            .unwrap();
        let tool_call = Reference::message("c1", "g1", "m1")
            .child("tool_calls")
            .child("t1");
        graph
            .apply(&Mutation::create(tool_call.clone(), ObjectType::ToolCall, json!({})))
            .unwrap();

        for part in ["a", "bc", "", "def"] {
            graph
                .apply(&Mutation::append(tool_call.clone(), "output", part))
                .unwrap();
        }
        assert_eq!(graph.resolve(&tool_call.child("output")).unwrap(), json!("abcdef"));
    }

    #[test]
    fn create_then_delete_restores_parent() {
        let mut graph = graph_with_chat();
        create_group(&mut graph, "g1");
        create_group(&mut graph, "g2");
        let before = graph.resolve(&groups()).unwrap();

        create_group(&mut graph, "g3");
        graph
            .apply(&Mutation::delete(Reference::message_group("c1", "g3")))
            .unwrap();
        assert_eq!(graph.resolve(&groups()).unwrap(), before);
    }

    #[test]
    fn map_entries_upsert_and_delete() {
        let mut graph = graph_with_chat();
        let entry = Reference::chat("c1").child("metadata").child("pinned");
        graph
            .apply(&Mutation::create(entry.clone(), ObjectType::Chat, json!({"on": true})))
            .unwrap();
        assert_eq!(graph.resolve(&entry).unwrap(), json!({"on": true}));
        graph.apply(&Mutation::delete(entry.clone())).unwrap();
        assert!(graph.get("c1").unwrap().metadata.is_empty());
        let err = graph.apply(&Mutation::delete(entry)).unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound(_)));
    }

    #[test]
    fn structured_options_decode() {
        let mut graph = graph_with_chat();
        graph
            .apply(&Mutation::set_value(
                Reference::chat("c1"),
                "chat_options",
                json!({"agent_id": "coder", "materials_ids": ["m1"]}),
            ))
            .unwrap();
        let options = &graph.get("c1").unwrap().chat_options;
        assert_eq!(options.agent_id, "coder");
        assert_eq!(options.materials_ids, vec!["m1".to_string()]);
        assert!(options.ai_can_add_extra_materials);

        let err = graph
            .apply(&Mutation::set_value(
                Reference::chat("c1"),
                "chat_options",
                json!({"materials_ids": "nope"}),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn error_kinds() {
        let mut graph = graph_with_chat();

        let err = graph
            .apply(&Mutation::set_value(Reference::new(["projects", "p1"]), "title", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound(_)));

        let err = graph
            .apply(&Mutation::set_value(Reference::chat("c9"), "title", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::AssetNotFound(_)));

        let err = graph
            .apply(&Mutation::delete(Reference::message_group("c1", "g9")))
            .unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound(_)));

        let err = graph
            .apply(&Mutation::set_value(Reference::message_group("c1", "g9"), "task", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound(_)));

        let err = graph
            .apply(&Mutation::create(
                Reference::message("c1", "g9", "m1"),
                ObjectType::Message,
                json!({}),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound(_)));

        let err = graph
            .apply(&Mutation::create(groups().child("g1"), ObjectType::Message, json!({})))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));

        let err = graph
            .apply(&Mutation::set_value(Reference::chat("c1"), "colour", "red"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));

        let err = graph
            .apply(&Mutation::append(Reference::chat("c1"), "title_edited", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn failed_mutation_leaves_graph_untouched() {
        let mut graph = graph_with_chat();
        create_group(&mut graph, "g1");
        let before = graph.clone();

        // Decodes per field but fails when the root is rebuilt.
        let err = graph
            .apply(&Mutation::set_value(
                Reference::message_group("c1", "g1"),
                "messages",
                json!([{"content": 1}]),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
        assert_eq!(graph, before);
    }

    #[test]
    fn root_create_and_delete_intents() {
        let mut graph = Graph::new();
        let op = graph
            .apply(&Mutation::create(
                Reference::chat("c1"),
                ObjectType::Chat,
                json!({"title": "First"}),
            ))
            .unwrap();
        assert!(matches!(op, AssetOperation::Create(ref chat) if chat.id == "c1" && chat.title == "First"));

        let op = graph
            .apply(&Mutation::create(Reference::chat("c1"), ObjectType::Chat, json!({})))
            .unwrap();
        assert!(matches!(op, AssetOperation::Update { .. }));
        assert_eq!(graph.get("c1").unwrap().title, "New Chat");

        let op = graph.apply(&Mutation::delete(Reference::chat("c1"))).unwrap();
        assert_eq!(op, AssetOperation::Delete { id: "c1".into() });
        assert!(graph.is_empty());

        let err = graph.apply(&Mutation::delete(Reference::chat("c1"))).unwrap_err();
        assert!(matches!(err, Error::AssetNotFound(_)));
    }

    #[test]
    fn resolve_reports_missing_paths() {
        let graph = graph_with_chat();
        let err = graph
            .resolve(&Reference::message_group("c1", "g1"))
            .unwrap_err();
        assert!(matches!(err, Error::ReferenceNotFound(_)));
        assert_eq!(graph.resolve(&Reference::chat("c1").child("title")).unwrap(), "New Chat");
    }
}
