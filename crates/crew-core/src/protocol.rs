// ABOUTME: Line protocol spoken with claude --input-format/--output-format stream-json
// ABOUTME: Encodes user turns, decodes output events, and formats buffer markers

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A decoded line from the worker's stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Assistant message; carries the text of every text block, in order
    Assistant { texts: Vec<String> },
    /// Turn finished. `error` is set when the CLI reported the turn as failed
    Result { error: Option<String> },
    /// Any other event type (system, user echo, stream deltas, ...)
    Other { kind: String },
}

/// Decode one stdout line. Returns `None` for anything that is not a JSON
/// object with a string `type` field.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let json: Value = serde_json::from_str(line).ok()?;
    decode_event(&json)
}

/// Decode an already-parsed event object.
pub fn decode_event(json: &Value) -> Option<StreamEvent> {
    let event_type = json.get("type")?.as_str()?;

    match event_type {
        "assistant" => {
            let texts = json
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_array())
                .map(|blocks| {
                    blocks
                        .iter()
                        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(StreamEvent::Assistant { texts })
        }
        "result" => {
            let is_error = json
                .get("is_error")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let error = is_error.then(|| result_error_message(json));
            Some(StreamEvent::Result { error })
        }
        other => Some(StreamEvent::Other {
            kind: other.to_string(),
        }),
    }
}

/// Error text of a failed `result` event: `errors` (array) joined with "; ",
/// else `error` (string), prefixed with `subtype` when present.
fn result_error_message(json: &Value) -> String {
    let detail = if let Some(errors) = json.get("errors").and_then(|v| v.as_array()) {
        let messages: Vec<&str> = errors.iter().filter_map(|e| e.as_str()).collect();
        if messages.is_empty() {
            "Unknown error".to_string()
        } else {
            messages.join("; ")
        }
    } else if let Some(error) = json.get("error").and_then(|v| v.as_str()) {
        error.to_string()
    } else {
        "Unknown error".to_string()
    };

    match json.get("subtype").and_then(|v| v.as_str()) {
        Some(subtype) => format!("{}: {}", subtype, detail),
        None => detail,
    }
}

#[derive(Serialize)]
struct UserEvent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: UserMessage<'a>,
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Encode a user turn as one newline-terminated stream-json line.
pub fn encode_user_message(content: &str) -> String {
    let event = UserEvent {
        kind: "user",
        message: UserMessage {
            role: "user",
            content,
        },
    };
    // Serializing borrowed strings into a struct of plain fields cannot fail
    let mut line = serde_json::to_string(&event).unwrap_or_default();
    line.push('\n');
    line
}

/// Supervisor-generated entries in a worker's output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// A non-blank line the worker wrote to stderr
    Stderr(String),
    /// The worker process exited
    Exit(Option<i32>),
    /// The process could not be started, waited on, or reported a failed turn
    Error(String),
    /// The caller interrupted the worker; carries the follow-up message
    Interrupted(String),
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Stderr(line) => write!(f, "[STDERR] {}", line),
            Marker::Exit(Some(code)) => write!(f, "[CLOSED] exit code: {}", code),
            Marker::Exit(None) => write!(f, "[CLOSED] exit code: null"),
            Marker::Error(message) => write!(f, "[ERROR] {}", message),
            Marker::Interrupted(message) => write!(f, "[INTERRUPTED] {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_text_blocks_in_order() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Looks "},{"type":"tool_use","id":"t1","name":"Read","input":{}},{"type":"text","text":"fine."}]}}"#;
        assert_eq!(
            decode_line(line),
            Some(StreamEvent::Assistant {
                texts: vec!["Looks ".to_string(), "fine.".to_string()]
            })
        );
    }

    #[test]
    fn assistant_without_message_has_no_text() {
        assert_eq!(
            decode_line(r#"{"type":"assistant"}"#),
            Some(StreamEvent::Assistant { texts: vec![] })
        );
    }

    #[test]
    fn thinking_blocks_are_not_text() {
        let json = json!({
            "type": "assistant",
            "message": {"content": [{"type": "thinking", "thinking": "hmm"}]}
        });
        assert_eq!(
            decode_event(&json),
            Some(StreamEvent::Assistant { texts: vec![] })
        );
    }

    #[test]
    fn bare_result_finishes_turn() {
        assert_eq!(
            decode_line(r#"{"type":"result"}"#),
            Some(StreamEvent::Result { error: None })
        );
    }

    #[test]
    fn successful_result_with_usage() {
        let json = json!({
            "type": "result",
            "subtype": "success",
            "is_error": false,
            "result": "Looks fine.",
            "usage": {"input_tokens": 10, "output_tokens": 3}
        });
        assert_eq!(decode_event(&json), Some(StreamEvent::Result { error: None }));
    }

    #[test]
    fn error_result_prefers_errors_array() {
        let json = json!({
            "type": "result",
            "subtype": "error_max_turns",
            "is_error": true,
            "errors": ["too many turns", "gave up"],
            "error": "ignored"
        });
        assert_eq!(
            decode_event(&json),
            Some(StreamEvent::Result {
                error: Some("error_max_turns: too many turns; gave up".to_string())
            })
        );
    }

    #[test]
    fn error_result_falls_back_to_error_string() {
        let json = json!({"type": "result", "is_error": true, "error": "boom"});
        assert_eq!(
            decode_event(&json),
            Some(StreamEvent::Result {
                error: Some("boom".to_string())
            })
        );

        let json = json!({"type": "result", "is_error": true, "errors": []});
        assert_eq!(
            decode_event(&json),
            Some(StreamEvent::Result {
                error: Some("Unknown error".to_string())
            })
        );
    }

    #[test]
    fn unknown_types_are_other() {
        assert_eq!(
            decode_line(r#"{"type":"system","subtype":"init","session_id":"abc"}"#),
            Some(StreamEvent::Other {
                kind: "system".to_string()
            })
        );
    }

    #[test]
    fn garbage_is_discarded() {
        assert_eq!(decode_line("claude> "), None);
        assert_eq!(decode_line("{\"type\":\"assistant\""), None);
        assert_eq!(decode_line(r#"{"foo":1}"#), None);
        assert_eq!(decode_line(r#"{"type":42}"#), None);
        assert_eq!(decode_line("[1,2,3]"), None);
        assert_eq!(decode_line("   "), None);
    }

    #[test]
    fn user_message_shape() {
        let line = encode_user_message("review this");
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(
            value,
            json!({"type": "user", "message": {"role": "user", "content": "review this"}})
        );
    }

    #[test]
    fn user_message_escapes_newlines() {
        let line = encode_user_message("line one\nline two \"quoted\"");
        assert_eq!(line.matches('\n').count(), 1);
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["message"]["content"], "line one\nline two \"quoted\"");
    }

    #[test]
    fn marker_display() {
        assert_eq!(Marker::Stderr("warn".into()).to_string(), "[STDERR] warn");
        assert_eq!(Marker::Exit(Some(0)).to_string(), "[CLOSED] exit code: 0");
        assert_eq!(Marker::Exit(None).to_string(), "[CLOSED] exit code: null");
        assert_eq!(Marker::Error("spawn failed".into()).to_string(), "[ERROR] spawn failed");
        assert_eq!(
            Marker::Interrupted("stop".into()).to_string(),
            "[INTERRUPTED] stop"
        );
    }
}
