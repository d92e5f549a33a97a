//! The conversation graph: chat → message groups → messages → tool calls.
//!
//! Every struct is `#[serde(default)]` so that sparse creation payloads
//! decode into a canonical, fully-populated value.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tool::Role;

/// Title given to chats that have not been renamed yet.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Chat ids name files on disk, so they must be a single plain path
/// component.
pub fn validate_chat_id(id: &str) -> Result<()> {
    let bad = id.is_empty()
        || id == "."
        || id.contains("..")
        || id.contains(['/', '\\', '\0']);
    if bad {
        return Err(Error::InvalidValue(format!("invalid chat id {id:?}")));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat (root object)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub title_edited: bool,
    pub last_modified: DateTime<Utc>,
    pub chat_options: ChatOptions,
    pub message_groups: Vec<MessageGroup>,
    pub is_analysis_in_progress: bool,
    /// Free-form per-chat values keyed by name.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Default for Chat {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: DEFAULT_CHAT_TITLE.into(),
            title_edited: false,
            last_modified: DateTime::<Utc>::default(),
            chat_options: ChatOptions::default(),
            message_groups: Vec::new(),
            is_analysis_in_progress: false,
            metadata: BTreeMap::new(),
        }
    }
}

/// Where a message lives inside a chat.
#[derive(Debug, Clone, Copy)]
pub struct MessageLocation<'a> {
    pub message_group: &'a MessageGroup,
    pub message: &'a ChatMessage,
}

/// Where a tool call lives inside a chat.
#[derive(Debug, Clone, Copy)]
pub struct ToolCallLocation<'a> {
    pub message_group: &'a MessageGroup,
    pub message: &'a ChatMessage,
    pub tool_call: &'a ToolCallRecord,
}

impl Chat {
    /// A fresh, empty chat stamped with the current time.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_modified: Utc::now(),
            ..Default::default()
        }
    }

    pub fn message_group(&self, message_group_id: &str) -> Option<&MessageGroup> {
        self.message_groups
            .iter()
            .find(|g| g.id == message_group_id)
    }

    pub fn message_location(&self, message_id: &str) -> Option<MessageLocation<'_>> {
        self.message_groups.iter().find_map(|group| {
            group
                .messages
                .iter()
                .find(|m| m.id == message_id)
                .map(|message| MessageLocation {
                    message_group: group,
                    message,
                })
        })
    }

    pub fn tool_call_location(&self, tool_call_id: &str) -> Option<ToolCallLocation<'_>> {
        for group in &self.message_groups {
            for message in &group.messages {
                if let Some(tool_call) = message.tool_calls.iter().find(|t| t.id == tool_call_id) {
                    return Some(ToolCallLocation {
                        message_group: group,
                        message,
                        tool_call,
                    });
                }
            }
        }
        None
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat options (structured configuration)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatOptions {
    pub agent_id: String,
    pub materials_ids: Vec<String>,
    pub ai_can_add_extra_materials: bool,
    pub draft_command: Option<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            agent_id: String::new(),
            materials_ids: Vec::new(),
            ai_can_add_extra_materials: true,
            draft_command: None,
        }
    }
}

impl ChatOptions {
    /// True when the user has not pinned an agent, materials or a draft.
    pub fn is_default(&self) -> bool {
        self.agent_id.is_empty()
            && self.materials_ids.is_empty()
            && self.draft_command.as_deref().map_or(true, str::is_empty)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message groups, messages, tool calls
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A run of messages produced by one actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageGroup {
    pub id: String,
    pub agent_id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    /// The next step the director decided on.
    pub task: String,
    /// The director's reasoning, streamed while it is produced.
    pub analysis: String,
    pub materials_ids: Vec<String>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatMessage {
    pub id: String,
    pub timestamp: String,
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub is_streaming: bool,
}

/// A code tool call recorded in the chat (not the provider-level call).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCallRecord {
    pub id: String,
    pub language: Option<String>,
    pub code: String,
    pub headline: String,
    pub output: Option<String>,
    pub is_successful: bool,
    pub is_streaming: bool,
    pub is_executing: bool,
}
