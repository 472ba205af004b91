use serde_json::{Map, Value as JsonValue};

use crate::resilient_json::parse_lenient_json;
use crate::tool_expression::parse_tool_expression;

/// Name of the argument carrying unparseable text on the placeholder call.
pub const RAW_ARGUMENT_FIELD: &str = "_raw_arg_content";
pub const RAW_ARGUMENT_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToolCall {
    pub name: String,
    pub args: Map<String, JsonValue>,
    pub source: ArgumentSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentSource {
    Json,
    Expression,
    RawFallback,
}

type Strategy = fn(&str, &str) -> Option<DecodedToolCall>;

/// Tried in order; the first strategy that produces a call wins.
const STRATEGIES: &[Strategy] = &[from_json, from_expression];

/// Decodes client-supplied tool call arguments. Never fails: text no strategy
/// understands becomes a placeholder call carrying a truncated copy of it.
pub fn decode_tool_call(name: &str, raw_arguments: &str) -> DecodedToolCall {
    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(name, raw_arguments))
        .unwrap_or_else(|| raw_fallback(name, raw_arguments))
}

fn from_json(name: &str, raw: &str) -> Option<DecodedToolCall> {
    let args = if raw.trim().is_empty() {
        Map::new()
    } else {
        match parse_lenient_json(raw) {
            Ok(JsonValue::Object(args)) => args,
            Ok(_) => return None,
            Err(err) => {
                tracing::debug!(event = "tool_arguments_not_json", tool = %name, error = %err);
                return None;
            }
        }
    };
    Some(DecodedToolCall {
        name: name.to_string(),
        args,
        source: ArgumentSource::Json,
    })
}

fn from_expression(_name: &str, raw: &str) -> Option<DecodedToolCall> {
    let call = parse_tool_expression(raw).into_parsed()?;
    Some(DecodedToolCall {
        name: call.name,
        args: call.args,
        source: ArgumentSource::Expression,
    })
}

fn raw_fallback(name: &str, raw: &str) -> DecodedToolCall {
    tracing::warn!(event = "tool_arguments_malformed", tool = %name, length = raw.len());
    let truncated: String = raw.chars().take(RAW_ARGUMENT_LIMIT).collect();
    let mut args = Map::new();
    args.insert(RAW_ARGUMENT_FIELD.to_string(), JsonValue::String(truncated));
    DecodedToolCall {
        name: name.to_string(),
        args,
        source: ArgumentSource::RawFallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_arguments_win() {
        let call = decode_tool_call("read_file", r#"{"path":"a.txt"} trailing"#);
        assert_eq!(call.source, ArgumentSource::Json);
        assert_eq!(call.name, "read_file");
        assert_eq!(JsonValue::Object(call.args), json!({"path": "a.txt"}));
    }

    #[test]
    fn empty_arguments_are_an_empty_object() {
        let call = decode_tool_call("ls", "  ");
        assert_eq!(call.source, ArgumentSource::Json);
        assert!(call.args.is_empty());
    }

    #[test]
    fn expression_arguments_take_the_expression_name() {
        let call = decode_tool_call("tool", r#"run_command(command="cargo fmt")"#);
        assert_eq!(call.source, ArgumentSource::Expression);
        assert_eq!(call.name, "run_command");
        assert_eq!(call.args["command"], "cargo fmt");
    }

    #[test]
    fn non_object_json_falls_through() {
        let call = decode_tool_call("ls", "[1, 2]");
        assert_eq!(call.source, ArgumentSource::RawFallback);
        assert_eq!(call.args[RAW_ARGUMENT_FIELD], "[1, 2]");
    }

    #[test]
    fn garbage_becomes_truncated_placeholder() {
        let raw = "x".repeat(1500);
        let call = decode_tool_call("write_file", &raw);
        assert_eq!(call.source, ArgumentSource::RawFallback);
        assert_eq!(call.name, "write_file");
        let kept = call.args[RAW_ARGUMENT_FIELD].as_str().unwrap();
        assert_eq!(kept.chars().count(), RAW_ARGUMENT_LIMIT);
    }
}
