//! `chatsync decode`: inspect what the partial decoder makes of a
//! truncated document.

use std::io::Read;

use serde_json::{json, Value};

use cs_providers::{close_partial, decode_partial_status};

/// Render the decode of `text`: `{"complete": .., "fields": {..}}`, or
/// `null` when nothing can be recovered yet.
pub fn render(text: &str) -> Value {
    match decode_partial_status(text) {
        Some(partial) => json!({
            "complete": partial.complete,
            "fields": partial.fields,
        }),
        None => Value::Null,
    }
}

pub fn run(closed: bool) -> anyhow::Result<()> {
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    // A trailing newline from the shell is not part of the document.
    let text = text.strip_suffix('\n').unwrap_or(&text);

    if closed {
        println!("{}", close_partial(text));
    } else {
        println!("{}", serde_json::to_string_pretty(&render(text))?);
    }
    Ok(())
}
