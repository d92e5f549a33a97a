//! Tolerant decoding of JSON objects that are still being streamed.
//!
//! A model emits tool-call arguments a few characters at a time. To surface
//! fields before the document is finished, the text seen so far is closed
//! off (open strings, arrays and objects are terminated in reverse order of
//! opening) and handed to the strict parser. No other repair is attempted:
//! a dangling key, a trailing comma or a half-written literal yields `None`
//! until more text arrives.

use serde_json::{Map, Value};

/// Fields decoded from a possibly incomplete object.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialObject {
    /// Top-level fields in document order.
    pub fields: Map<String, Value>,
    /// The text parsed as-is, without closing anything.
    pub complete: bool,
}

/// Append the closers a truncated document is missing.
///
/// Inside strings a raw newline is escaped as `\n`; outside strings a `}`
/// or `]` only closes the innermost container when it matches it.
pub fn close_partial(text: &str) -> String {
    let mut closers: Vec<char> = Vec::new();
    let mut escaped = false;
    let mut out = String::with_capacity(text.len() + 4);

    for ch in text.chars() {
        if closers.last() == Some(&'"') {
            match ch {
                '"' if !escaped => {
                    closers.pop();
                }
                '\\' => escaped = !escaped,
                '\n' if !escaped => {
                    out.push_str("\\n");
                    continue;
                }
                _ => escaped = false,
            }
        } else {
            match ch {
                '"' => closers.push('"'),
                '{' => closers.push('}'),
                '[' => closers.push(']'),
                '}' | ']' if closers.last() == Some(&ch) => {
                    closers.pop();
                }
                _ => {}
            }
        }
        out.push(ch);
    }

    out.extend(closers.iter().rev());
    out
}

/// Decode the object prefix in `text`, reporting whether it was complete.
pub fn decode_partial_status(text: &str) -> Option<PartialObject> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return match value {
            Value::Object(fields) => Some(PartialObject {
                fields,
                complete: true,
            }),
            _ => None,
        };
    }

    match serde_json::from_str::<Value>(&close_partial(text)) {
        Ok(Value::Object(fields)) => Some(PartialObject {
            fields,
            complete: false,
        }),
        _ => None,
    }
}

/// Decode the object prefix in `text`. `None` when nothing usable can be
/// recovered yet, or when the document is not an object.
pub fn decode_partial(text: &str) -> Option<Map<String, Value>> {
    decode_partial_status(text).map(|partial| partial.fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decoded(text: &str) -> Option<Value> {
        decode_partial(text).map(Value::Object)
    }

    #[test]
    fn open_string_is_closed() {
        assert_eq!(
            decoded(r#"{"agent_id": "assis"#),
            Some(json!({"agent_id": "assis"}))
        );
    }

    #[test]
    fn dangling_key_is_rejected() {
        assert_eq!(decoded(r#"{"agent_id": "assistant", "next"#), None);
        assert_eq!(decoded(r#"{"agent_id": "assistant", "next_step": "#), None);
        assert_eq!(decoded(r#"{"agent_id": "assistant","#), None);
    }

    #[test]
    fn nested_containers_close_in_reverse_order() {
        assert_eq!(
            decoded(r#"{"ids": ["a", "b"#),
            Some(json!({"ids": ["a", "b"]}))
        );
        assert_eq!(
            decoded(r#"{"outer": {"inner": [{"k": "v"#),
            Some(json!({"outer": {"inner": [{"k": "v"}]}}))
        );
    }

    #[test]
    fn raw_newline_inside_string_is_escaped() {
        assert_eq!(
            decoded("{\"thinking_process\": \"line one\nline two"),
            Some(json!({"thinking_process": "line one\nline two"}))
        );
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        assert_eq!(
            decoded(r#"{"code": "print(\"hi"#),
            Some(json!({"code": "print(\"hi"}))
        );
        assert_eq!(
            decoded(r#"{"path": "C:\\dir\\"#),
            Some(json!({"path": "C:\\dir\\"}))
        );
    }

    #[test]
    fn trailing_backslash_cannot_be_closed() {
        assert_eq!(decoded(r#"{"a": "x\"#), None);
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        assert_eq!(
            decoded(r#"{"a": "{[", "b": "]}"#),
            Some(json!({"a": "{[", "b": "]}"}))
        );
    }

    #[test]
    fn mismatched_closer_does_not_pop() {
        // The stray `]` is kept verbatim, so the repaired text is invalid.
        assert_eq!(close_partial(r#"{"a": 1]"#), r#"{"a": 1]}"#);
        assert_eq!(decoded(r#"{"a": 1]"#), None);
    }

    #[test]
    fn no_other_repair() {
        assert_eq!(decoded("{a: 1}"), None);
        assert_eq!(decoded(r#"{"a": 1,}"#), None);
        assert_eq!(decoded(r#"{"a": tr"#), None);
        assert_eq!(decoded(""), None);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert_eq!(decoded("[1, 2]"), None);
        assert_eq!(decoded("[1, 2"), None);
        assert_eq!(decoded(r#""text""#), None);
        assert_eq!(decoded("42"), None);
    }

    #[test]
    fn complete_flag_tracks_repair() {
        let partial = decode_partial_status(r#"{"a": "b"}"#).unwrap();
        assert!(partial.complete);
        let partial = decode_partial_status(r#"{"a": "b""#).unwrap();
        assert!(!partial.complete);
        assert_eq!(partial.fields["a"], "b");
    }

    #[test]
    fn keys_keep_document_order() {
        let fields = decode_partial(r#"{"z": 1, "a": 2, "m": "x"#).unwrap();
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    const PLAN: &str = r#"{
  "thinking_process": "The user asked for \"a plan\".\nStart with flights.",
  "next_step": "Book flights",
  "agent_id": "assistant",
  "relevant_material_ids": ["travel_guide", "budget"],
  "is_users_turn": false,
  "nested": {"list": [{"k": "v"}, []], "flag": true, "none": null}
}"#;

    #[test]
    fn valid_document_decodes_like_the_strict_parser() {
        let strict: Value = serde_json::from_str(PLAN).unwrap();
        assert_eq!(decoded(PLAN), Some(strict));
    }

    /// `partial` is what `full` looked like earlier in the stream.
    fn is_prefix_consistent(partial: &Value, full: &Value) -> bool {
        match (partial, full) {
            (Value::String(p), Value::String(f)) => f.starts_with(p.as_str()),
            (Value::Array(p), Value::Array(f)) => {
                p.len() <= f.len() && p.iter().zip(f).all(|(a, b)| is_prefix_consistent(a, b))
            }
            (Value::Object(p), Value::Object(f)) => p
                .iter()
                .all(|(k, v)| f.get(k).is_some_and(|fv| is_prefix_consistent(v, fv))),
            (p, f) => p == f,
        }
    }

    #[test]
    fn every_prefix_is_none_or_consistent() {
        let full: Value = serde_json::from_str(PLAN).unwrap();
        let mut seen = 0;
        for (i, _) in PLAN.char_indices() {
            if let Some(partial) = decoded(&PLAN[..i]) {
                seen += 1;
                assert!(
                    is_prefix_consistent(&partial, &full),
                    "prefix {i} decoded to {partial}"
                );
            }
        }
        assert!(seen > 0);
    }
}
