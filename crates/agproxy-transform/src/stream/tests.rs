use super::*;
use crate::failure::SESSION_EXPIRED_MESSAGE;
use serde_json::json;

fn sse(frame: JsonValue) -> String {
    format!("data: {frame}\n\n")
}

fn text_frame(text: &str, finish: Option<&str>) -> JsonValue {
    let mut candidate = json!({"content": {"role": "model", "parts": [{"text": text}]}});
    if let Some(finish) = finish {
        candidate["finishReason"] = json!(finish);
    }
    json!({"response": {"candidates": [candidate]}})
}

fn call_frame(name: &str, args: JsonValue) -> JsonValue {
    json!({"response": {"candidates": [{"content": {"parts": [
        {"functionCall": {"name": name, "args": args}}
    ]}}]}})
}

fn run(body: &[&[u8]]) -> Vec<StreamFrame> {
    let mut adapter = ChatCompletionStreamAdapter::new("ag-pro");
    let mut out = Vec::new();
    for chunk in body {
        out.extend(adapter.on_bytes(chunk));
    }
    out.extend(adapter.on_end());
    out
}

fn chunks(frames: &[StreamFrame]) -> Vec<&CreateChatCompletionStreamResponse> {
    frames
        .iter()
        .filter_map(|frame| match frame {
            StreamFrame::Chunk(chunk) => Some(chunk),
            _ => None,
        })
        .collect()
}

fn tool_chunks(frames: &[StreamFrame]) -> Vec<&ChatCompletionMessageToolCallChunk> {
    chunks(frames)
        .into_iter()
        .filter_map(|chunk| chunk.choices.first())
        .filter_map(|choice| choice.delta.tool_calls.as_ref())
        .flat_map(|calls| calls.iter())
        .collect()
}

/// Frames with the per-stream id and timestamp removed, for comparisons across runs.
fn normalized(frames: &[StreamFrame]) -> Vec<JsonValue> {
    frames
        .iter()
        .map(|frame| match frame {
            StreamFrame::Chunk(chunk) => {
                let mut value = serde_json::to_value(chunk).unwrap();
                value["id"] = JsonValue::Null;
                value["created"] = JsonValue::Null;
                if let Some(calls) = value["choices"][0]["delta"]["tool_calls"].as_array_mut() {
                    for call in calls {
                        if call.get("id").is_some() {
                            call["id"] = JsonValue::Null;
                        }
                    }
                }
                value
            }
            StreamFrame::Error(error) => serde_json::to_value(error).unwrap(),
            StreamFrame::Done => json!("[DONE]"),
        })
        .collect()
}

#[test]
fn text_frames_become_content_deltas() {
    let body = format!(
        "{}{}",
        sse(text_frame("Hel", None)),
        sse(text_frame("lo", Some("STOP")))
    );
    let frames = run(&[body.as_bytes()]);

    assert_eq!(frames.len(), 3);
    let chunks = chunks(&frames);
    assert_eq!(chunks[0].choices[0].delta.content.as_deref(), Some("Hel"));
    assert_eq!(chunks[0].choices[0].finish_reason, None);
    assert_eq!(
        chunks[1].choices[0].delta.content.as_deref(),
        Some("lo \n\n*(via Antigravity Proxy)*")
    );
    assert_eq!(
        chunks[1].choices[0].finish_reason,
        Some(ChatCompletionFinishReason::Stop)
    );
    assert_eq!(chunks[0].id, chunks[1].id);
    assert_eq!(chunks[0].model, "ag-pro");
    assert_eq!(frames[2], StreamFrame::Done);
}

#[test]
fn chunk_json_has_explicit_null_finish_reason() {
    let body = sse(text_frame("x", None));
    let frames = run(&[body.as_bytes()]);
    let sse = frames[0].to_sse();
    assert!(sse.starts_with("data: {"));
    assert!(sse.ends_with("}\n\n"));
    let value: JsonValue = serde_json::from_str(&sse["data: ".len()..].trim()).unwrap();
    assert_eq!(value["object"], "chat.completion.chunk");
    assert!(value["choices"][0]["finish_reason"].is_null());
    assert_eq!(frames[1].to_sse(), "data: [DONE]\n\n");
}

#[test]
fn attribution_only_on_last_part_of_stopped_candidate() {
    let frame = json!({"response": {"candidates": [{
        "content": {"parts": [{"text": "a"}, {"text": "b"}]},
        "finishReason": "STOP"
    }]}});
    let body = sse(frame);
    let frames = run(&[body.as_bytes()]);
    let contents: Vec<_> = chunks(&frames)
        .iter()
        .map(|chunk| chunk.choices[0].delta.content.clone().unwrap())
        .collect();
    assert_eq!(contents, vec!["a".to_string(), format!("b{ATTRIBUTION_SUFFIX}")]);

    let body = sse(text_frame("cut", Some("MAX_TOKENS")));
    let frames = run(&[body.as_bytes()]);
    let chunk = chunks(&frames)[0];
    assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("cut"));
    assert_eq!(
        chunk.choices[0].finish_reason,
        Some(ChatCompletionFinishReason::Length)
    );
}

#[test]
fn argument_slices_rebuild_serialized_arguments() {
    let content = "é".repeat(150) + &"x".repeat(200);
    let args = json!({"path": "notes.md", "content": content});
    let body = sse(call_frame("write_file", args.clone()));
    let frames = run(&[body.as_bytes()]);

    let calls = tool_chunks(&frames);
    assert_eq!(calls[0].id.as_deref().map(|id| id.starts_with("call_")), Some(true));
    assert_eq!(calls[0].r#type, Some(ChatCompletionToolCallType::Function));
    assert_eq!(calls[0].function.name.as_deref(), Some("write_file"));
    assert_eq!(calls[0].function.arguments.as_deref(), Some(""));

    let fragments: Vec<&str> = calls[1..]
        .iter()
        .map(|call| {
            assert_eq!(call.index, 0);
            assert!(call.id.is_none() && call.function.name.is_none());
            call.function.arguments.as_deref().unwrap()
        })
        .collect();
    assert!(fragments.len() > 1);
    assert!(fragments
        .iter()
        .all(|fragment| fragment.chars().count() <= ARGUMENT_SLICE_CHARS));
    assert_eq!(fragments.concat(), args.to_string());
}

#[test]
fn identical_calls_are_emitted_once() {
    let args = json!({"command": "ls"});
    let body = format!(
        "{}{}{}",
        sse(call_frame("run_command", args.clone())),
        sse(call_frame("run_command", args.clone())),
        sse(call_frame("run_command", json!({"command": "pwd"})))
    );
    let frames = run(&[body.as_bytes()]);

    let starts: Vec<_> = tool_chunks(&frames)
        .into_iter()
        .filter(|call| call.id.is_some())
        .collect();
    assert_eq!(starts.len(), 2);
    assert_eq!(starts[0].index, 0);
    assert_eq!(starts[1].index, 1);
    assert_ne!(starts[0].id, starts[1].id);
}

#[test]
fn finish_only_frame_still_reports_reason() {
    let frame = json!({"response": {"candidates": [{
        "content": {"parts": [{"text": ""}]},
        "finishReason": "TOOL_USE"
    }]}});
    let body = sse(frame);
    let frames = run(&[body.as_bytes()]);
    let chunk = chunks(&frames)[0];
    assert_eq!(chunk.choices[0].delta, ChatCompletionStreamResponseDelta::default());
    assert_eq!(
        chunk.choices[0].finish_reason,
        Some(ChatCompletionFinishReason::ToolCalls)
    );
}

#[test]
fn usage_is_last_seen_and_emitted_before_done() {
    let mut first = text_frame("a", None);
    first["response"]["usageMetadata"] =
        json!({"promptTokenCount": 1, "candidatesTokenCount": 1, "totalTokenCount": 2});
    let mut second = text_frame("b", Some("STOP"));
    second["response"]["usageMetadata"] =
        json!({"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15});
    let body = format!("{}{}", sse(first), sse(second));
    let frames = run(&[body.as_bytes()]);

    let usage_frame = &frames[frames.len() - 2];
    let StreamFrame::Chunk(chunk) = usage_frame else {
        panic!("expected usage chunk");
    };
    assert!(chunk.choices.is_empty());
    let usage = chunk.usage.as_ref().unwrap();
    assert_eq!(
        (usage.prompt_tokens, usage.completion_tokens, usage.total_tokens),
        (10, 5, 15)
    );
    assert_eq!(frames.last(), Some(&StreamFrame::Done));
}

#[test]
fn usage_survives_null_candidates() {
    let body = sse(json!({"response": {
        "candidates": null,
        "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
    }}));
    let frames = run(&[body.as_bytes()]);

    assert_eq!(frames.len(), 2);
    let usage = chunks(&frames)[0].usage.as_ref().unwrap();
    assert_eq!(
        (usage.prompt_tokens, usage.completion_tokens, usage.total_tokens),
        (3, 2, 5)
    );
    assert_eq!(frames[1], StreamFrame::Done);
}

#[test]
fn malformed_lines_are_skipped() {
    let body = format!(
        "data: {{broken\n\n{}data: \n\n: ping\n\n{}",
        sse(text_frame("ok", None)),
        sse(json!({"traceId": "abc"}))
    );
    let frames = run(&[body.as_bytes()]);
    assert_eq!(frames.len(), 2);
    assert_eq!(
        chunks(&frames)[0].choices[0].delta.content.as_deref(),
        Some("ok")
    );
}

#[test]
fn segmentation_does_not_change_frames() {
    let body = format!(
        "{}{}{}",
        sse(text_frame("héllo wörld", None)),
        sse(call_frame("read_file", json!({"path": "ü.txt"}))),
        sse(text_frame("done", Some("STOP")))
    );
    let bytes = body.as_bytes();
    let whole = normalized(&run(&[bytes]));

    for split in (1..bytes.len()).step_by(7) {
        let (left, right) = bytes.split_at(split);
        assert_eq!(normalized(&run(&[left, right])), whole, "split at {split}");
    }
    let singles: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(normalized(&run(&singles)), whole);
    let uneven: Vec<&[u8]> = bytes.chunks(13).collect();
    assert_eq!(normalized(&run(&uneven)), whole);
}

#[test]
fn unterminated_final_line_is_processed() {
    let body = format!("data: {}", text_frame("tail", None));
    let frames = run(&[body.as_bytes()]);
    assert_eq!(
        chunks(&frames)[0].choices[0].delta.content.as_deref(),
        Some("tail")
    );
}

#[test]
fn backend_unauthorized_yields_one_error_then_done() {
    let mut adapter = ChatCompletionStreamAdapter::new("ag-pro");
    let frames = adapter.on_error(BackendFailure::Status {
        status: 401,
        body: "denied".to_string(),
    });
    assert_eq!(frames.len(), 2);
    let StreamFrame::Error(error) = &frames[0] else {
        panic!("expected error frame");
    };
    assert_eq!(error.error.message, SESSION_EXPIRED_MESSAGE);
    assert_eq!(error.error.code, Some(401));
    assert_eq!(frames[1], StreamFrame::Done);

    assert!(adapter.on_end().is_empty());
    assert!(adapter.on_bytes(b"data: {}\n").is_empty());
}

#[test]
fn slice_chars_respects_boundaries() {
    assert_eq!(slice_chars("", 3), Vec::<&str>::new());
    assert_eq!(slice_chars("abcdefg", 3), vec!["abc", "def", "g"]);
    assert_eq!(slice_chars("ééé", 2), vec!["éé", "é"]);
}
