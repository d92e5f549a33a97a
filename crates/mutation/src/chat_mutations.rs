//! Typed chat edits that lower to generic [`Mutation`]s.
//!
//! Callers name objects by id only; the owning group or message is looked
//! up in the current chat to build the full reference.

use serde_json::{json, Value};

use cs_domain::chat::{Chat, ChatOptions};
use cs_domain::error::{Error, Result};
use cs_domain::tool::Role;

use crate::mutation::Mutation;
use crate::reference::Reference;
use crate::schema::ObjectType;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatMutation {
    SetTitle {
        title: String,
    },
    SetChatOptions {
        options: ChatOptions,
    },
    SetIsAnalysisInProgress {
        is_analysis_in_progress: bool,
    },
    CreateMessageGroup {
        message_group_id: String,
        agent_id: String,
        role: Role,
        username: String,
        email: String,
        task: String,
        analysis: String,
        materials_ids: Vec<String>,
    },
    DeleteMessageGroup {
        message_group_id: String,
    },
    SetAgentIdMessageGroup {
        message_group_id: String,
        agent_id: String,
    },
    SetTaskMessageGroup {
        message_group_id: String,
        task: String,
    },
    SetAnalysisMessageGroup {
        message_group_id: String,
        analysis: String,
    },
    AppendToAnalysisMessageGroup {
        message_group_id: String,
        analysis_delta: String,
    },
    SetMaterialsIdsMessageGroup {
        message_group_id: String,
        materials_ids: Vec<String>,
    },
    CreateMessage {
        message_group_id: String,
        message_id: String,
        timestamp: String,
        content: String,
    },
    AppendToContentMessage {
        message_id: String,
        content_delta: String,
    },
    SetIsStreamingMessage {
        message_id: String,
        is_streaming: bool,
    },
    DeleteMessage {
        message_id: String,
    },
    CreateToolCall {
        message_id: String,
        tool_call_id: String,
        language: Option<String>,
        code: String,
        headline: String,
    },
    AppendToOutputToolCall {
        tool_call_id: String,
        output_delta: String,
    },
    SetIsExecutingToolCall {
        tool_call_id: String,
        is_executing: bool,
    },
}

impl ChatMutation {
    /// Lower to a generic mutation against `chat`.
    pub fn to_mutation(&self, chat: &Chat) -> Result<Mutation> {
        let root = Reference::chat(chat.id.as_str());
        let group = |id: &str| Reference::message_group(chat.id.as_str(), id);

        let mutation = match self {
            Self::SetTitle { title } => Mutation::set_value(root.child("title"), "title", title.as_str()),
            Self::SetChatOptions { options } => {
                Mutation::set_value(root, "chat_options", serde_json::to_value(options)?)
            }
            Self::SetIsAnalysisInProgress {
                is_analysis_in_progress,
            } => Mutation::set_value(root, "is_analysis_in_progress", *is_analysis_in_progress),

            Self::CreateMessageGroup {
                message_group_id,
                agent_id,
                role,
                username,
                email,
                task,
                analysis,
                materials_ids,
            } => Mutation::create(
                group(message_group_id),
                ObjectType::MessageGroup,
                json!({
                    "agent_id": agent_id,
                    "role": role,
                    "username": username,
                    "email": email,
                    "task": task,
                    "analysis": analysis,
                    "materials_ids": materials_ids,
                }),
            ),
            Self::DeleteMessageGroup { message_group_id } => {
                Mutation::delete(group(message_group_id))
            }
            Self::SetAgentIdMessageGroup {
                message_group_id,
                agent_id,
            } => Mutation::set_value(group(message_group_id), "agent_id", agent_id.as_str()),
            Self::SetTaskMessageGroup {
                message_group_id,
                task,
            } => Mutation::set_value(group(message_group_id), "task", task.as_str()),
            Self::SetAnalysisMessageGroup {
                message_group_id,
                analysis,
            } => Mutation::set_value(group(message_group_id), "analysis", analysis.as_str()),
            Self::AppendToAnalysisMessageGroup {
                message_group_id,
                analysis_delta,
            } => Mutation::append(group(message_group_id), "analysis", analysis_delta.as_str()),
            Self::SetMaterialsIdsMessageGroup {
                message_group_id,
                materials_ids,
            } => Mutation::set_value(
                group(message_group_id),
                "materials_ids",
                Value::from(materials_ids.clone()),
            ),

            Self::CreateMessage {
                message_group_id,
                message_id,
                timestamp,
                content,
            } => Mutation::create(
                Reference::message(chat.id.as_str(), message_group_id.as_str(), message_id.as_str()),
                ObjectType::Message,
                json!({"timestamp": timestamp, "content": content}),
            ),
            Self::AppendToContentMessage {
                message_id,
                content_delta,
            } => Mutation::append(message_ref(chat, message_id)?, "content", content_delta.as_str()),
            Self::SetIsStreamingMessage {
                message_id,
                is_streaming,
            } => Mutation::set_value(message_ref(chat, message_id)?, "is_streaming", *is_streaming),
            Self::DeleteMessage { message_id } => Mutation::delete(message_ref(chat, message_id)?),

            Self::CreateToolCall {
                message_id,
                tool_call_id,
                language,
                code,
                headline,
            } => Mutation::create(
                message_ref(chat, message_id)?
                    .child("tool_calls")
                    .child(tool_call_id.as_str()),
                ObjectType::ToolCall,
                json!({
                    "language": language,
                    "code": code,
                    "headline": headline,
                    "is_streaming": true,
                }),
            ),
            Self::AppendToOutputToolCall {
                tool_call_id,
                output_delta,
            } => Mutation::append(tool_call_ref(chat, tool_call_id)?, "output", output_delta.as_str()),
            Self::SetIsExecutingToolCall {
                tool_call_id,
                is_executing,
            } => Mutation::set_value(tool_call_ref(chat, tool_call_id)?, "is_executing", *is_executing),
        };
        Ok(mutation)
    }
}

fn message_ref(chat: &Chat, message_id: &str) -> Result<Reference> {
    let location = chat
        .message_location(message_id)
        .ok_or_else(|| Error::ObjectNotFound(format!("message {message_id} in chat {}", chat.id)))?;
    Ok(Reference::message(
        chat.id.as_str(),
        location.message_group.id.as_str(),
        message_id,
    ))
}

fn tool_call_ref(chat: &Chat, tool_call_id: &str) -> Result<Reference> {
    let location = chat.tool_call_location(tool_call_id).ok_or_else(|| {
        Error::ObjectNotFound(format!("tool call {tool_call_id} in chat {}", chat.id))
    })?;
    Ok(Reference::message(
        chat.id.as_str(),
        location.message_group.id.as_str(),
        location.message.id.as_str(),
    )
    .child("tool_calls")
    .child(tool_call_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::Graph;

    fn apply(graph: &mut Graph, edit: ChatMutation) {
        let chat = graph.get("c1").unwrap().clone();
        let mutation = edit.to_mutation(&chat).unwrap();
        graph.apply(&mutation).unwrap();
    }

    #[test]
    fn builds_a_conversation() {
        let mut graph = Graph::new();
        graph.insert(Chat::empty("c1"));

        apply(
            &mut graph,
            ChatMutation::CreateMessageGroup {
                message_group_id: "g1".into(),
                agent_id: "assistant".into(),
                role: Role::Assistant,
                username: String::new(),
                email: String::new(),
                task: "answer".into(),
                analysis: String::new(),
                materials_ids: vec!["doc".into()],
            },
        );
        apply(
            &mut graph,
            ChatMutation::CreateMessage {
                message_group_id: "g1".into(),
                message_id: "m1".into(),
                timestamp: "2024-01-01T00:00:00Z".into(),
                content: "Hel".into(),
            },
        );
        apply(
            &mut graph,
            ChatMutation::AppendToContentMessage {
                message_id: "m1".into(),
                content_delta: "lo".into(),
            },
        );
        apply(
            &mut graph,
            ChatMutation::CreateToolCall {
                message_id: "m1".into(),
                tool_call_id: "t1".into(),
                language: Some("python".into()),
                code: "print(1)".into(),
                headline: "Print".into(),
            },
        );
        apply(
            &mut graph,
            ChatMutation::AppendToOutputToolCall {
                tool_call_id: "t1".into(),
                output_delta: "1\n".into(),
            },
        );

        let chat = graph.get("c1").unwrap();
        let group = chat.message_group("g1").unwrap();
        assert_eq!(group.role, Role::Assistant);
        assert_eq!(group.materials_ids, vec!["doc".to_string()]);
        let message = &group.messages[0];
        assert_eq!(message.content, "Hello");
        assert_eq!(message.tool_calls[0].output.as_deref(), Some("1\n"));
        assert!(message.tool_calls[0].is_streaming);
    }

    #[test]
    fn unknown_message_is_reported() {
        let chat = Chat::empty("c1");
        let err = ChatMutation::AppendToContentMessage {
            message_id: "m9".into(),
            content_delta: "x".into(),
        }
        .to_mutation(&chat)
        .unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound(_)));
    }

    #[test]
    fn title_is_field_addressed() {
        let chat = Chat::empty("c1");
        let m = ChatMutation::SetTitle { title: "Hi".into() }
            .to_mutation(&chat)
            .unwrap();
        assert_eq!(m.reference().to_string(), "/chats/c1/title");
    }
}
