//! `chatsync analyze`: one director step against the configured model.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use cs_providers::LlmProvider;

use crate::analysis::run_analysis;
use crate::mutator::{ChatMutator, MirrorEnvelope};
use crate::state::AppState;

/// Run the step, streaming every mirrored mutation to stdout as a JSON
/// line. Ctrl-C cancels the model call.
pub async fn run(
    state: AppState,
    mut mirror_rx: mpsc::UnboundedReceiver<MirrorEnvelope>,
    provider: Arc<dyn LlmProvider>,
    chat_id: String,
) -> anyhow::Result<()> {
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(envelope) = mirror_rx.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(line) => {
                    let _ = writeln!(stdout, "{line}");
                }
                Err(e) => tracing::error!(error = %e, "could not serialize mutation"),
            }
        }
    });

    let cancel = state.cancel_map.register(&chat_id);
    let interrupt = {
        let cancel_map = state.cancel_map.clone();
        let chat_id = chat_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(chat_id = %chat_id, "interrupt, cancelling analysis");
                cancel_map.cancel(&chat_id);
            }
        })
    };

    let result = match ChatMutator::acquire(&state, &chat_id).await {
        Ok(mutator) => {
            run_analysis(&mutator, provider.as_ref(), &state.config.analysis, &cancel).await
        }
        Err(e) => Err(e),
    };

    interrupt.abort();
    state.cancel_map.remove(&chat_id);
    state.queue.flush().await?;

    // Closing the mirror channel lets the printer finish.
    drop(state);
    printer.await.context("mutation printer")?;

    let outcome = result?;
    eprintln!(
        "next: {} ({}){}",
        outcome.agent_id,
        outcome.next_step,
        if outcome.materials_ids.is_empty() {
            String::new()
        } else {
            format!(" with {}", outcome.materials_ids.join(", "))
        }
    );
    Ok(())
}
