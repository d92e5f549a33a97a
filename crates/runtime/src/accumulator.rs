//! Stream accumulation and incremental mutation emission.
//!
//! [`StreamAccumulator`] folds provider [`StreamEvent`]s into a response
//! while it is still arriving. After every merged event an
//! [`IncrementalEmitter`] decodes whatever tool-call arguments are
//! available and turns new or grown fields into mutations against a
//! target object, so mirrors see the model's output as it is produced.

use std::collections::HashMap;

use serde_json::{Map, Value};

use cs_domain::error::{Error, Result};
use cs_domain::stream::{StreamEvent, Usage};
use cs_domain::tool::ToolCall;
use cs_mutation::{Mutation, Reference};
use cs_providers::{decode_partial, decode_partial_status, ChatResponse};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Accumulator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    AwaitingFirstDelta,
    Accumulating,
    /// `Done` seen; trailing usage chunks may still arrive.
    Finalizing,
    Complete,
    Failed,
    Cancelled,
}

impl StreamPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamPhase::Complete | StreamPhase::Failed | StreamPhase::Cancelled
        )
    }
}

/// A tool call whose arguments are still being streamed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialToolCall {
    pub index: usize,
    pub call_id: String,
    pub tool_name: String,
    /// Raw argument text so far.
    pub arguments: String,
}

#[derive(Debug)]
pub struct StreamAccumulator {
    phase: StreamPhase,
    model: String,
    content: String,
    tool_calls: Vec<PartialToolCall>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    failure: Option<String>,
}

impl StreamAccumulator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            phase: StreamPhase::AwaitingFirstDelta,
            model: model.into(),
            content: String::new(),
            tool_calls: Vec::new(),
            usage: None,
            finish_reason: None,
            failure: None,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Tool calls in order of first appearance.
    pub fn tool_calls(&self) -> &[PartialToolCall] {
        &self.tool_calls
    }

    /// Merge one event.
    pub fn push(&mut self, event: StreamEvent) -> Result<()> {
        if self.phase.is_terminal() {
            return Err(Error::ProtocolViolation(format!(
                "event after stream ended ({:?})",
                self.phase
            )));
        }

        match event {
            StreamEvent::Done {
                usage,
                finish_reason,
            } => {
                if usage.is_some() {
                    self.usage = usage;
                }
                if finish_reason.is_some() {
                    self.finish_reason = finish_reason;
                }
                self.phase = StreamPhase::Finalizing;
            }
            StreamEvent::Error { message } => {
                self.phase = StreamPhase::Failed;
                self.failure = Some(message.clone());
                return Err(Error::Provider {
                    provider: self.model.clone(),
                    message,
                });
            }
            _ if self.phase == StreamPhase::Finalizing => {
                return Err(Error::ProtocolViolation("delta after done".into()));
            }
            StreamEvent::Token { text } => {
                self.phase = StreamPhase::Accumulating;
                self.content.push_str(&text);
            }
            StreamEvent::ToolCallDelta {
                index,
                call_id,
                tool_name,
                arguments,
            } => {
                self.phase = StreamPhase::Accumulating;
                let position = match self.tool_calls.iter().position(|c| c.index == index) {
                    Some(position) => position,
                    None => {
                        self.tool_calls.push(PartialToolCall {
                            index,
                            ..Default::default()
                        });
                        self.tool_calls.len() - 1
                    }
                };
                let call = &mut self.tool_calls[position];
                if let Some(id) = call_id {
                    call.call_id = id;
                }
                if let Some(name) = tool_name {
                    call.tool_name = name;
                }
                call.arguments.push_str(&arguments);
            }
        }
        Ok(())
    }

    /// The stream ended; produce the accumulated response.
    pub fn finish(&mut self) -> Result<ChatResponse> {
        match self.phase {
            StreamPhase::Cancelled => return Err(Error::Cancelled),
            StreamPhase::Failed => {
                return Err(Error::Provider {
                    provider: self.model.clone(),
                    message: self.failure.clone().unwrap_or_default(),
                })
            }
            StreamPhase::Complete => {
                return Err(Error::ProtocolViolation("stream finished twice".into()))
            }
            StreamPhase::AwaitingFirstDelta | StreamPhase::Accumulating => {
                tracing::debug!(model = %self.model, "stream closed without a done event");
            }
            StreamPhase::Finalizing => {}
        }
        self.phase = StreamPhase::Complete;

        Ok(ChatResponse {
            content: self.content.clone(),
            tool_calls: self
                .tool_calls
                .iter()
                .map(|c| ToolCall {
                    call_id: c.call_id.clone(),
                    tool_name: c.tool_name.clone(),
                    arguments: c.arguments.clone(),
                })
                .collect(),
            usage: self.usage.clone(),
            model: self.model.clone(),
            finish_reason: self.finish_reason.clone(),
        })
    }

    pub fn cancel(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = StreamPhase::Cancelled;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Emitter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    /// Emit the finished value once.
    Replace,
    /// Stream the value as it grows.
    Append,
}

/// Maps a top-level argument field onto a field of the target object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    /// Argument name in the tool call.
    pub field: String,
    /// Field on the target object.
    pub key: String,
    pub mode: EmitMode,
}

impl FieldBinding {
    pub fn replace(field: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            key: key.into(),
            mode: EmitMode::Replace,
        }
    }

    pub fn append(field: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            key: key.into(),
            mode: EmitMode::Append,
        }
    }
}

/// What the finished response turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum EmitOutcome {
    Text {
        content: String,
    },
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: Map<String, Value>,
    },
}

pub struct IncrementalEmitter {
    target: Reference,
    bindings: Vec<FieldBinding>,
    content_binding: Option<String>,
    /// Last value emitted per target key.
    emitted: HashMap<String, Value>,
}

impl IncrementalEmitter {
    pub fn new(target: Reference) -> Self {
        Self {
            target,
            bindings: Vec::new(),
            content_binding: None,
            emitted: HashMap::new(),
        }
    }

    pub fn with_binding(mut self, binding: FieldBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Stream free-text content into `key` while no tool call is present.
    pub fn with_content_binding(mut self, key: impl Into<String>) -> Self {
        self.content_binding = Some(key.into());
        self
    }

    pub fn target(&self) -> &Reference {
        &self.target
    }

    /// Mutations for everything that changed since the last call.
    pub fn emit(&mut self, acc: &StreamAccumulator) -> Vec<Mutation> {
        let mut out = Vec::new();

        if acc.tool_calls().is_empty() {
            if let Some(key) = self.content_binding.clone() {
                if !acc.content().is_empty() {
                    let value = Value::String(acc.content().to_owned());
                    self.emit_field(&key, EmitMode::Append, value, &mut out);
                }
            }
            return out;
        }

        // Only the first call drives the bindings, as in `finalize`.
        let call = &acc.tool_calls()[0];
        if let Some(partial) = decode_partial_status(&call.arguments) {
            self.emit_fields(&partial.fields, partial.complete, &mut out);
        }
        out
    }

    /// Close out a finished response.
    ///
    /// With `expect_single`, more than one tool call is a protocol
    /// violation; otherwise only the first call drives the bindings.
    pub fn finalize(
        &mut self,
        response: &ChatResponse,
        expect_single: bool,
    ) -> Result<(Vec<Mutation>, EmitOutcome)> {
        let mut out = Vec::new();

        let Some(call) = response.tool_calls.first() else {
            if let Some(key) = &self.content_binding {
                let value = Value::String(response.content.clone());
                out.push(Mutation::set_value(self.target.clone(), key.as_str(), value.clone()));
                self.emitted.insert(key.clone(), value);
            }
            return Ok((
                out,
                EmitOutcome::Text {
                    content: response.content.clone(),
                },
            ));
        };

        if expect_single && response.tool_calls.len() > 1 {
            return Err(Error::ProtocolViolation(format!(
                "expected one tool call, got {}",
                response.tool_calls.len()
            )));
        }

        let arguments = decode_partial(&call.arguments).ok_or_else(|| {
            Error::MalformedToolArguments(format!(
                "{}: could not parse {:?}",
                call.tool_name, call.arguments
            ))
        })?;
        self.emit_fields(&arguments, true, &mut out);

        Ok((
            out,
            EmitOutcome::ToolCall {
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                arguments,
            },
        ))
    }

    fn emit_fields(&mut self, fields: &Map<String, Value>, complete: bool, out: &mut Vec<Mutation>) {
        let last = fields.len().saturating_sub(1);
        for (position, (field, value)) in fields.iter().enumerate() {
            // A later key means this one's value is finished.
            let stable = complete || position < last;
            let bindings: Vec<(String, EmitMode)> = self
                .bindings
                .iter()
                .filter(|b| &b.field == field)
                .map(|b| (b.key.clone(), b.mode))
                .collect();
            for (key, mode) in bindings {
                if mode == EmitMode::Replace && !stable {
                    continue;
                }
                self.emit_field(&key, mode, value.clone(), out);
            }
        }
    }

    fn emit_field(&mut self, key: &str, mode: EmitMode, value: Value, out: &mut Vec<Mutation>) {
        let previous = self.emitted.get(key);
        if previous == Some(&value) {
            return;
        }

        let mutation = match (mode, previous, &value) {
            (EmitMode::Append, Some(Value::String(old)), Value::String(new))
                if new.starts_with(old.as_str()) =>
            {
                Mutation::append(self.target.clone(), key, &new[old.len()..])
            }
            _ => Mutation::set_value(self.target.clone(), key, value.clone()),
        };
        out.push(mutation);
        self.emitted.insert(key.to_owned(), value);
    }
}
