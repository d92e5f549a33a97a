//! Paths into the conversation graph.
//!
//! `["chats", "c1", "message_groups", "g1", "messages", "m1"]`: segment 0
//! names the top-level collection, segment 1 the root object, the rest
//! walk lists (by element id), maps (by key) and struct fields (by name).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::apply::CHATS;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference {
    segments: Vec<String>,
}

impl Reference {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Reference to a chat root object.
    pub fn chat(chat_id: impl Into<String>) -> Self {
        Self::new([CHATS.to_owned(), chat_id.into()])
    }

    pub fn message_group(chat_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self::chat(chat_id).child("message_groups").child(group_id)
    }

    pub fn message(
        chat_id: impl Into<String>,
        group_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self::message_group(chat_id, group_id)
            .child("messages")
            .child(message_id)
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The reference with its final segment dropped.
    pub fn parent(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn collection(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn root_id(&self) -> Option<&str> {
        self.segments.get(1).map(String::as_str)
    }

    /// Final segment: the identifier (or field name) this reference names.
    pub fn id(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Exactly `[collection, root_id]`.
    pub fn is_root(&self) -> bool {
        self.segments.len() == 2
    }

    /// Segments below the root object.
    pub fn path(&self) -> &[String] {
        self.segments.get(2..).unwrap_or(&[])
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Reference {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.split('/').filter(|seg| !seg.is_empty())))
    }
}
