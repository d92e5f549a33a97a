//! The director step: ask the model who speaks next and stream its
//! reasoning into a fresh message group while it is produced.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cs_domain::chat::Chat;
use cs_domain::config::{AgentConfig, AnalysisConfig, MaterialStatus};
use cs_domain::error::{Error, Result};
use cs_domain::tool::{Message, Role, ToolDefinition};
use cs_domain::trace::TraceEvent;
use cs_mutation::{ChatMutation, Reference};
use cs_providers::{ChatRequest, LlmProvider};

use crate::accumulator::{EmitOutcome, FieldBinding, IncrementalEmitter, StreamAccumulator};
use crate::mutator::ChatMutator;

/// Name of the function the director calls.
pub const PLAN_TOOL: &str = "plan";

/// Pseudo agent meaning "hand the turn back to the human".
pub const USER_AGENT_ID: &str = "user";

/// The director's decision, as decoded from the plan arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    pub thinking_process: String,
    pub next_step: String,
    pub agent_id: String,
    pub relevant_material_ids: Vec<String>,
    pub is_users_turn: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub message_group_id: String,
    pub agent_id: String,
    pub materials_ids: Vec<String>,
    pub next_step: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request construction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The `plan` function offered to the model. `agent_id` is restricted to
/// the configured agents plus [`USER_AGENT_ID`].
pub fn plan_tool(agents: &[AgentConfig]) -> ToolDefinition {
    let agent_ids: Vec<&str> = std::iter::once(USER_AGENT_ID)
        .chain(agents.iter().map(|a| a.id.as_str()))
        .collect();

    ToolDefinition {
        name: PLAN_TOOL.into(),
        description: "Decide who should act next in the conversation and what they should do."
            .into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "thinking_process": {
                    "type": "string",
                    "description": "Short reasoning about the state of the conversation."
                },
                "next_step": {
                    "type": "string",
                    "description": "What the chosen agent should do next, in one or two sentences."
                },
                "agent_id": {
                    "type": "string",
                    "enum": agent_ids,
                    "description": "Who should act next."
                },
                "relevant_material_ids": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Materials the next agent needs."
                },
                "is_users_turn": {
                    "type": "boolean",
                    "description": "Whether the human user should respond next."
                }
            },
            "required": [
                "thinking_process",
                "next_step",
                "agent_id",
                "relevant_material_ids",
                "is_users_turn"
            ]
        }),
    }
}

/// Flatten the chat history into model messages. Empty text is skipped.
pub fn convert_messages(chat: &Chat) -> Vec<Message> {
    let mut out = Vec::new();
    for group in &chat.message_groups {
        match group.role {
            Role::System => {
                if !group.task.is_empty() {
                    out.push(Message::system(format!(
                        "Next step for {}: {}",
                        group.agent_id, group.task
                    )));
                }
            }
            Role::User => {
                for message in &group.messages {
                    if !message.content.is_empty() {
                        out.push(Message::user(message.content.as_str()));
                    }
                }
            }
            Role::Assistant | Role::Tool => {
                for message in &group.messages {
                    if !message.content.is_empty() {
                        out.push(Message::assistant(message.content.as_str()));
                    }
                    for call in &message.tool_calls {
                        let Some(output) = call.output.as_deref().filter(|o| !o.is_empty()) else {
                            continue;
                        };
                        out.push(Message::assistant(format!(
                            "Output of `{}`:\n{}",
                            call.headline, output
                        )));
                    }
                }
            }
        }
    }
    out
}

fn system_prompt(cfg: &AnalysisConfig) -> String {
    let mut prompt = cfg.system_prompt.clone();

    prompt.push_str("\n\nAvailable agents:\n");
    prompt.push_str(&format!(
        "* {USER_AGENT_ID} - User - When a human user needs to respond\n"
    ));
    for agent in &cfg.agents {
        prompt.push_str(&format!("* {} - {} - {}\n", agent.id, agent.name, agent.usage));
    }

    let materials: Vec<&str> = cfg
        .materials
        .iter()
        .filter(|m| m.status == MaterialStatus::Enabled)
        .map(|m| m.id.as_str())
        .collect();
    if !materials.is_empty() {
        prompt.push_str("\nAvailable materials:\n");
        for id in materials {
            prompt.push_str(&format!("* {id}\n"));
        }
    }
    prompt
}

pub fn build_request(chat: &Chat, cfg: &AnalysisConfig) -> ChatRequest {
    let mut messages = vec![Message::system(system_prompt(cfg))];
    messages.extend(convert_messages(chat));
    messages.push(Message::system(cfg.last_system_prompt.as_str()));

    ChatRequest {
        messages,
        tools: vec![plan_tool(&cfg.agents)],
        tool_choice: cfg.force_call.then(|| PLAN_TOOL.to_owned()),
        ..Default::default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decision rules
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The configured default agent if present, else the first agent.
pub fn default_agent(cfg: &AnalysisConfig) -> Option<&AgentConfig> {
    cfg.agents
        .iter()
        .find(|a| a.id == cfg.default_agent_id)
        .or_else(|| cfg.agents.first())
}

/// Who acts next. `history` is the chat as it was before the director
/// group was added.
pub fn pick_agent(plan: &Plan, history: &Chat, cfg: &AnalysisConfig) -> String {
    let fallback = default_agent(cfg)
        .map(|a| a.id.clone())
        .unwrap_or_else(|| cfg.default_agent_id.clone());

    if plan.is_users_turn {
        // The user would be answering themselves.
        let user_spoke_last = history
            .message_groups
            .last()
            .is_some_and(|g| g.role == Role::User);
        return if user_spoke_last {
            fallback
        } else {
            USER_AGENT_ID.to_owned()
        };
    }

    cfg.agents
        .iter()
        .find(|a| a.id == plan.agent_id)
        .map(|a| a.id.clone())
        .unwrap_or(fallback)
}

/// Enabled materials the model asked for (capped), then every forced one.
pub fn relevant_materials(requested: &[String], cfg: &AnalysisConfig) -> Vec<String> {
    let picked = cfg
        .materials
        .iter()
        .filter(|m| m.status == MaterialStatus::Enabled && requested.contains(&m.id))
        .take(cfg.max_relevant_materials);
    let forced = cfg
        .materials
        .iter()
        .filter(|m| m.status == MaterialStatus::Forced);
    picked.chain(forced).map(|m| m.id.clone()).collect()
}

fn plan_emitter(target: Reference) -> IncrementalEmitter {
    IncrementalEmitter::new(target)
        .with_binding(FieldBinding::replace("agent_id", "agent_id"))
        .with_binding(FieldBinding::replace("relevant_material_ids", "materials_ids"))
        .with_binding(FieldBinding::replace("next_step", "task"))
        .with_binding(FieldBinding::append("thinking_process", "analysis"))
        .with_content_binding("analysis")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The step
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one director step on the chat held by `mutator`.
///
/// Whatever happens, `is_analysis_in_progress` is false afterwards. On
/// failure the reason is appended to the group's analysis and returned.
pub async fn run_analysis(
    mutator: &ChatMutator,
    provider: &dyn LlmProvider,
    cfg: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<AnalysisResult> {
    if cfg.agents.is_empty() {
        return Err(Error::Config("no active agents".into()));
    }

    let history = mutator.chat()?;
    let message_group_id = uuid::Uuid::new_v4().to_string();
    mutator.mutate_typed(ChatMutation::CreateMessageGroup {
        message_group_id: message_group_id.clone(),
        agent_id: cfg.director_agent_id.clone(),
        role: Role::System,
        username: String::new(),
        email: String::new(),
        task: String::new(),
        analysis: String::new(),
        materials_ids: Vec::new(),
    })?;
    TraceEvent::AnalysisStarted {
        chat_id: history.id.clone(),
        message_group_id: message_group_id.clone(),
    }
    .emit();

    let result = analyse(mutator, provider, cfg, cancel, &history, &message_group_id).await;

    let reset = mutator.mutate_typed(ChatMutation::SetIsAnalysisInProgress {
        is_analysis_in_progress: false,
    });
    if let Err(e) = &result {
        tracing::warn!(
            chat_id = %history.id,
            message_group_id = %message_group_id,
            error = %e,
            "analysis aborted"
        );
        let aborted = mutator.mutate_typed(ChatMutation::AppendToAnalysisMessageGroup {
            message_group_id: message_group_id.clone(),
            analysis_delta: format!("Analysis aborted: {e}"),
        });
        if let Err(e) = aborted {
            tracing::error!(chat_id = %history.id, error = %e, "could not record abort");
        }
    }

    TraceEvent::AnalysisFinished {
        chat_id: history.id.clone(),
        message_group_id: message_group_id.clone(),
        agent_id: result
            .as_ref()
            .map(|r| r.agent_id.clone())
            .unwrap_or_default(),
        outcome: match &result {
            Ok(_) => "ok",
            Err(Error::Cancelled) => "cancelled",
            Err(_) => "error",
        },
    }
    .emit();

    let result = result?;
    reset?;
    Ok(result)
}

async fn analyse(
    mutator: &ChatMutator,
    provider: &dyn LlmProvider,
    cfg: &AnalysisConfig,
    cancel: &CancellationToken,
    history: &Chat,
    message_group_id: &str,
) -> Result<AnalysisResult> {
    mutator.mutate_typed(ChatMutation::SetIsAnalysisInProgress {
        is_analysis_in_progress: true,
    })?;
    mutator.mutate_typed(ChatMutation::SetAnalysisMessageGroup {
        message_group_id: message_group_id.to_owned(),
        analysis: String::new(),
    })?;

    let request = build_request(history, cfg);
    let mut emitter = plan_emitter(Reference::message_group(
        mutator.chat_id(),
        message_group_id,
    ));
    let mut acc = StreamAccumulator::new(provider.default_model());

    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            acc.cancel();
            return Err(Error::Cancelled);
        }
        stream = provider.chat_stream(request) => stream?,
    };

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                acc.cancel();
                return Err(Error::Cancelled);
            }
            event = stream.next() => event,
        };
        let Some(event) = event else { break };

        acc.push(event?)?;
        for mutation in emitter.emit(&acc) {
            mutator.mutate(mutation)?;
        }
    }
    drop(stream);

    let response = acc.finish()?;
    let (mutations, outcome) = emitter.finalize(&response, true)?;
    for mutation in mutations {
        mutator.mutate(mutation)?;
    }

    let plan = match outcome {
        EmitOutcome::Text { content } => Plan {
            thinking_process: content,
            ..Default::default()
        },
        EmitOutcome::ToolCall {
            tool_name,
            arguments,
            ..
        } => serde_json::from_value(Value::Object(arguments))
            .map_err(|e| Error::MalformedToolArguments(format!("{tool_name}: {e}")))?,
    };

    let agent_id = pick_agent(&plan, history, cfg);
    let materials_ids = relevant_materials(&plan.relevant_material_ids, cfg);
    tracing::debug!(
        chat_id = %mutator.chat_id(),
        agent_id = %agent_id,
        materials = materials_ids.len(),
        "director decided"
    );

    let group = message_group_id.to_owned();
    mutator.mutate_typed(ChatMutation::SetAgentIdMessageGroup {
        message_group_id: group.clone(),
        agent_id: agent_id.clone(),
    })?;
    mutator.mutate_typed(ChatMutation::SetMaterialsIdsMessageGroup {
        message_group_id: group.clone(),
        materials_ids: materials_ids.clone(),
    })?;
    mutator.mutate_typed(ChatMutation::SetTaskMessageGroup {
        message_group_id: group.clone(),
        task: plan.next_step.clone(),
    })?;
    mutator.mutate_typed(ChatMutation::SetAnalysisMessageGroup {
        message_group_id: group.clone(),
        analysis: plan.thinking_process,
    })?;

    Ok(AnalysisResult {
        message_group_id: group,
        agent_id,
        materials_ids,
        next_step: plan.next_step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_domain::chat::{ChatMessage, MessageGroup, ToolCallRecord};
    use cs_domain::config::MaterialConfig;

    fn cfg() -> AnalysisConfig {
        AnalysisConfig {
            agents: vec![
                AgentConfig {
                    id: "coder".into(),
                    name: "Coder".into(),
                    usage: "Writes code".into(),
                },
                AgentConfig {
                    id: "assistant".into(),
                    name: "Assistant".into(),
                    usage: "Talks".into(),
                },
            ],
            materials: vec![
                MaterialConfig { id: "a".into(), status: MaterialStatus::Enabled },
                MaterialConfig { id: "b".into(), status: MaterialStatus::Enabled },
                MaterialConfig { id: "c".into(), status: MaterialStatus::Enabled },
                MaterialConfig { id: "off".into(), status: MaterialStatus::Disabled },
                MaterialConfig { id: "always".into(), status: MaterialStatus::Forced },
            ],
            max_relevant_materials: 2,
            ..Default::default()
        }
    }

    fn history(last_role: Option<Role>) -> Chat {
        let mut chat = Chat::empty("c1");
        if let Some(role) = last_role {
            chat.message_groups.push(MessageGroup {
                id: "g0".into(),
                role,
                ..Default::default()
            });
        }
        chat
    }

    fn plan(agent_id: &str, is_users_turn: bool) -> Plan {
        Plan {
            agent_id: agent_id.into(),
            is_users_turn,
            ..Default::default()
        }
    }

    #[test]
    fn known_agent_is_picked() {
        assert_eq!(pick_agent(&plan("coder", false), &history(None), &cfg()), "coder");
    }

    #[test]
    fn unknown_agent_falls_back_to_default() {
        assert_eq!(pick_agent(&plan("ghost", false), &history(None), &cfg()), "assistant");
    }

    #[test]
    fn first_agent_when_default_is_missing() {
        let mut cfg = cfg();
        cfg.agents.retain(|a| a.id != "assistant");
        assert_eq!(pick_agent(&plan("ghost", false), &history(None), &cfg), "coder");
    }

    #[test]
    fn users_turn_hands_back_to_user() {
        let chat = history(Some(Role::Assistant));
        assert_eq!(pick_agent(&plan("coder", true), &chat, &cfg()), USER_AGENT_ID);
    }

    #[test]
    fn user_never_answers_themselves() {
        let chat = history(Some(Role::User));
        assert_eq!(pick_agent(&plan("coder", true), &chat, &cfg()), "assistant");
    }

    #[test]
    fn materials_are_capped_then_forced_added() {
        let requested: Vec<String> = ["c", "off", "b", "a", "nope"].map(String::from).into();
        // Config order, capped at 2, disabled never picked.
        assert_eq!(relevant_materials(&requested, &cfg()), ["a", "b", "always"]);
        assert_eq!(relevant_materials(&[], &cfg()), ["always"]);
    }

    #[test]
    fn plan_schema_lists_user_and_agents() {
        let tool = plan_tool(&cfg().agents);
        assert_eq!(tool.name, PLAN_TOOL);
        assert_eq!(
            tool.parameters["properties"]["agent_id"]["enum"],
            json!(["user", "coder", "assistant"])
        );
        let keys: Vec<&str> = tool.parameters["properties"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(
            keys,
            ["thinking_process", "next_step", "agent_id", "relevant_material_ids", "is_users_turn"]
        );
    }

    #[test]
    fn history_is_flattened() {
        let mut chat = Chat::empty("c1");
        chat.message_groups = vec![
            MessageGroup {
                id: "g1".into(),
                role: Role::User,
                messages: vec![
                    ChatMessage { id: "m1".into(), content: "hi".into(), ..Default::default() },
                    ChatMessage { id: "m2".into(), ..Default::default() },
                ],
                ..Default::default()
            },
            MessageGroup {
                id: "g2".into(),
                role: Role::System,
                agent_id: "director".into(),
                task: "answer".into(),
                ..Default::default()
            },
            MessageGroup {
                id: "g3".into(),
                role: Role::Assistant,
                messages: vec![ChatMessage {
                    id: "m3".into(),
                    content: "running".into(),
                    tool_calls: vec![ToolCallRecord {
                        id: "t1".into(),
                        headline: "Count".into(),
                        output: Some("3".into()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            },
        ];

        let messages = convert_messages(&chat);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::System, Role::Assistant, Role::Assistant]);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].content, "Next step for director: answer");
        assert_eq!(messages[3].content, "Output of `Count`:\n3");
    }

    #[test]
    fn request_forces_plan_call() {
        let request = build_request(&Chat::empty("c1"), &cfg());
        assert_eq!(request.tool_choice.as_deref(), Some(PLAN_TOOL));
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[0].content.contains("* coder - Coder - Writes code"));
        assert!(request.messages[0].content.contains("* a\n"));
        assert!(!request.messages[0].content.contains("* off"));

        let mut cfg = cfg();
        cfg.force_call = false;
        assert_eq!(build_request(&Chat::empty("c1"), &cfg).tool_choice, None);
    }
}
