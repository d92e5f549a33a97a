//! Shared types for the chatsync workspace: the conversation graph,
//! provider-agnostic stream events, the error taxonomy, trace events,
//! and configuration.

pub mod chat;
pub mod config;
pub mod error;
pub mod stream;
pub mod tool;
pub mod trace;
