use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reference::Reference;
use crate::schema::ObjectType;

/// A single change to the conversation graph.
///
/// On the wire:
/// `{"type":"set_value","ref":["chats","c1"],"key":"title","value":"Hi"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    /// Insert `object` at `ref`. The last segment of `ref` becomes the
    /// new object's id; any `id` inside `object` is ignored.
    Create {
        #[serde(rename = "ref")]
        reference: Reference,
        object_type: ObjectType,
        object: Value,
    },
    /// Remove the object at `ref` from its parent.
    Delete {
        #[serde(rename = "ref")]
        reference: Reference,
    },
    /// Replace field `key` of the object at `ref`.
    SetValue {
        #[serde(rename = "ref")]
        reference: Reference,
        key: String,
        value: Value,
    },
    /// Concatenate `value` onto string field `key` of the object at `ref`.
    AppendToString {
        #[serde(rename = "ref")]
        reference: Reference,
        key: String,
        value: String,
    },
}

impl Mutation {
    pub fn create(reference: Reference, object_type: ObjectType, object: Value) -> Self {
        Self::Create {
            reference,
            object_type,
            object,
        }
    }

    pub fn delete(reference: Reference) -> Self {
        Self::Delete { reference }
    }

    pub fn set_value(reference: Reference, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::SetValue {
            reference,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn append(reference: Reference, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::AppendToString {
            reference,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn reference(&self) -> &Reference {
        match self {
            Self::Create { reference, .. }
            | Self::Delete { reference }
            | Self::SetValue { reference, .. }
            | Self::AppendToString { reference, .. } => reference,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Delete { .. } => "delete",
            Self::SetValue { .. } => "set_value",
            Self::AppendToString { .. } => "append_to_string",
        }
    }
}
