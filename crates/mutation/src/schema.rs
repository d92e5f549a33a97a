//! Reflection table for the conversation graph.
//!
//! Traversal and mutation never touch typed fields directly; they ask this
//! table what a field is (scalar, text, nested struct, id-keyed list, or
//! free map) and walk the serialized form accordingly. Adding a field to a
//! domain type means adding one arm here.

use std::fmt;

use cs_domain::chat::{Chat, ChatMessage, ChatOptions, MessageGroup, ToolCallRecord};
use cs_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Chat,
    ChatOptions,
    MessageGroup,
    Message,
    ToolCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any JSON value that is replaced wholesale.
    Scalar,
    /// A string (possibly null) that supports append.
    Text,
    /// A single nested object.
    Struct(ObjectType),
    /// Objects addressed by their `id` field.
    List(ObjectType),
    /// Opaque values addressed by key.
    Map,
}

impl ObjectType {
    pub const ALL: [ObjectType; 5] = [
        ObjectType::Chat,
        ObjectType::ChatOptions,
        ObjectType::MessageGroup,
        ObjectType::Message,
        ObjectType::ToolCall,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Chat => "chat",
            ObjectType::ChatOptions => "chat_options",
            ObjectType::MessageGroup => "message_group",
            ObjectType::Message => "message",
            ObjectType::ToolCall => "tool_call",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.name() == name)
    }

    /// Whether instances carry an `id` that list lookups match against.
    pub fn has_id(self) -> bool {
        !matches!(self, ObjectType::ChatOptions)
    }

    pub fn field(self, name: &str) -> Option<FieldKind> {
        use FieldKind::*;
        let kind = match (self, name) {
            (ObjectType::Chat, "id" | "title_edited" | "last_modified") => Scalar,
            (ObjectType::Chat, "is_analysis_in_progress") => Scalar,
            (ObjectType::Chat, "title") => Text,
            (ObjectType::Chat, "chat_options") => Struct(ObjectType::ChatOptions),
            (ObjectType::Chat, "message_groups") => List(ObjectType::MessageGroup),
            (ObjectType::Chat, "metadata") => Map,

            (ObjectType::ChatOptions, "agent_id" | "draft_command") => Text,
            (ObjectType::ChatOptions, "materials_ids" | "ai_can_add_extra_materials") => Scalar,

            (ObjectType::MessageGroup, "id" | "role" | "materials_ids") => Scalar,
            (ObjectType::MessageGroup, "agent_id" | "username" | "email") => Text,
            (ObjectType::MessageGroup, "task" | "analysis") => Text,
            (ObjectType::MessageGroup, "messages") => List(ObjectType::Message),

            (ObjectType::Message, "id" | "is_streaming") => Scalar,
            (ObjectType::Message, "timestamp" | "content") => Text,
            (ObjectType::Message, "tool_calls") => List(ObjectType::ToolCall),

            (ObjectType::ToolCall, "id" | "is_successful" | "is_streaming" | "is_executing") => {
                Scalar
            }
            (ObjectType::ToolCall, "language" | "code" | "headline" | "output") => Text,

            _ => return None,
        };
        Some(kind)
    }

    /// Round-trip `value` through the typed struct, filling defaults and
    /// rejecting payloads that do not fit.
    pub fn canonicalize(self, value: Value) -> Result<Value> {
        fn through<T>(value: Value) -> serde_json::Result<Value>
        where
            T: serde::de::DeserializeOwned + Serialize,
        {
            serde_json::to_value(serde_json::from_value::<T>(value)?)
        }

        let out = match self {
            ObjectType::Chat => through::<Chat>(value),
            ObjectType::ChatOptions => through::<ChatOptions>(value),
            ObjectType::MessageGroup => through::<MessageGroup>(value),
            ObjectType::Message => through::<ChatMessage>(value),
            ObjectType::ToolCall => through::<ToolCallRecord>(value),
        };
        out.map_err(|e| Error::InvalidValue(format!("{self}: {e}")))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
