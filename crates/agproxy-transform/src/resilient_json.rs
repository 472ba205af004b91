use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed arguments: {reason}")]
pub struct MalformedArguments {
    pub reason: String,
}

/// Parses `text` as JSON. When that fails, retries with the text cut after its
/// last `}` or `]`, which recovers arguments followed by stray tokens.
pub fn parse_lenient_json(text: &str) -> Result<JsonValue, MalformedArguments> {
    let trimmed = text.trim();
    let first_error = match serde_json::from_str(trimmed) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let Some(end) = trimmed.rfind(['}', ']']) else {
        return Err(MalformedArguments {
            reason: first_error.to_string(),
        });
    };
    serde_json::from_str(&trimmed[..=end]).map_err(|err| MalformedArguments {
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_json_matches_direct_parse() {
        let samples = [
            r#"{"path":"a.txt"}"#,
            r#"  {"nested":{"list":[1,2,{"x":null}]},"s":"}]"}  "#,
            "[1, 2, 3]",
            "\"just a string\"",
            "42",
            "true",
            "{}",
        ];
        for sample in samples {
            let direct: JsonValue = serde_json::from_str(sample).unwrap();
            assert_eq!(parse_lenient_json(sample).unwrap(), direct, "{sample}");
        }
    }

    #[test]
    fn recovers_value_followed_by_junk() {
        let suffixes = ["garbage", " <|end|>", "\n```", "...", ")"];
        let values = [json!({"path": "a.txt", "n": 2}), json!([1, "two", {"three": 3}])];
        for value in &values {
            for suffix in suffixes {
                let text = format!("{value}{suffix}");
                assert_eq!(&parse_lenient_json(&text).unwrap(), value, "{text}");
            }
        }
    }

    #[test]
    fn unrecoverable_text_is_malformed() {
        assert!(parse_lenient_json("read_file(path=\"a\")").is_err());
        assert!(parse_lenient_json("{\"path\": ").is_err());
        assert!(parse_lenient_json("").is_err());
    }
}
