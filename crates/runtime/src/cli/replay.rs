//! `chatsync replay`: push a recorded mutation log through the engine.

use std::path::Path;

use anyhow::Context;

use cs_mutation::Mutation;

use crate::mutator::ChatMutator;
use crate::state::AppState;

/// Parse a JSON-lines log. Blank lines are skipped.
pub fn parse_log(raw: &str, origin: &Path) -> anyhow::Result<Vec<Mutation>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: not a mutation", origin.display(), n + 1))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Apply `mutations` to `chat_id`, creating the chat when it is missing.
/// Rejected mutations are logged and skipped.
pub async fn replay(
    state: &AppState,
    chat_id: &str,
    mutations: &[Mutation],
) -> anyhow::Result<ReplaySummary> {
    let mutator = ChatMutator::acquire_or_create(state, chat_id).await?;
    let mut summary = ReplaySummary::default();
    for (n, mutation) in mutations.iter().enumerate() {
        match mutator.mutate(mutation.clone()) {
            Ok(()) => summary.applied += 1,
            Err(e) => {
                tracing::warn!(line = n + 1, error = %e, "mutation rejected");
                summary.rejected += 1;
            }
        }
    }
    drop(mutator);

    state.queue.flush().await?;
    Ok(summary)
}

pub async fn run(state: &AppState, file: &Path, chat: Option<String>) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let mutations = parse_log(&raw, file)?;

    let chat_id = chat
        .or_else(|| {
            mutations
                .first()
                .and_then(|m| m.reference().root_id().map(str::to_owned))
        })
        .context("no chat to replay into: pass --chat or a non-empty log")?;

    let summary = replay(state, &chat_id, &mutations).await?;
    eprintln!(
        "{} applied, {} rejected",
        summary.applied, summary.rejected
    );

    let chat = state
        .engine
        .lock()
        .chat(&chat_id)
        .cloned()
        .with_context(|| format!("chat {chat_id} vanished during replay"))?;
    println!("{}", serde_json::to_string_pretty(&chat)?);
    Ok(())
}
