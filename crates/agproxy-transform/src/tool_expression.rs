//! Parser for call expressions such as `read_file(path="a.txt", limit=20)`.
//!
//! Models sometimes emit tool invocations as code inside `<tool_code>` tags,
//! and some clients send tool arguments in the same notation instead of JSON.
//! The grammar is deliberately small:
//!
//! ```text
//! call   := IDENT "(" [arg ("," arg)* [","]] ")"
//! arg    := IDENT "=" value
//! value  := STRING | NUMBER | "true" | "false" | "null" | array | object
//! array  := "[" [value ("," value)* [","]] "]"
//! object := "{" [key ":" value ("," key ":" value)* [","]] "}"
//! key    := STRING | IDENT
//! ```
//!
//! Strings may use either quote style. Python spellings `True`, `False` and
//! `None` are accepted. An argument that does not fit the grammar is skipped
//! rather than failing the whole call.

use serde_json::{Map, Number, Value as JsonValue};

pub const TOOL_CODE_OPEN: &str = "<tool_code>";
pub const TOOL_CODE_CLOSE: &str = "</tool_code>";

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub name: String,
    pub args: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolExpression {
    Parsed(ParsedCall),
    NotRecognized,
}

impl ToolExpression {
    pub fn into_parsed(self) -> Option<ParsedCall> {
        match self {
            Self::Parsed(call) => Some(call),
            Self::NotRecognized => None,
        }
    }
}

/// Parses the first `name(...)` expression found in `text`.
///
/// A wrapper without keyword arguments, such as `print(read_file(path="x"))`,
/// yields the call nested inside it.
pub fn parse_tool_expression(text: &str) -> ToolExpression {
    let tokens = tokenize(text);
    match find_call(&tokens, 0, tokens.len()).and_then(|start| parse_call(&tokens, text, start)) {
        Some(call) => ToolExpression::Parsed(call),
        None => ToolExpression::NotRecognized,
    }
}

/// Index of the first `IDENT (` pair within `tokens[from..to]`.
fn find_call(tokens: &[Token], from: usize, to: usize) -> Option<usize> {
    let window = tokens.get(from..to)?;
    window
        .windows(2)
        .position(|pair| {
            matches!(pair[0].kind, TokenKind::Ident(_)) && pair[1].kind == TokenKind::LParen
        })
        .map(|offset| from + offset)
}

fn parse_call(tokens: &[Token], text: &str, start: usize) -> Option<ParsedCall> {
    let TokenKind::Ident(name) = &tokens.get(start)?.kind else {
        return None;
    };
    let mut parser = Parser {
        tokens,
        source: text,
        pos: start + 2,
    };
    let args = parser.parse_arguments()?;
    if args.is_empty()
        && let Some(inner) = find_call(tokens, start + 2, parser.pos)
        && let Some(call) = parse_call(tokens, text, inner)
    {
        return Some(call);
    }
    Some(ParsedCall {
        name: name.clone(),
        args,
    })
}

/// Iterates the bodies of `<tool_code>...</tool_code>` blocks, shortest match first.
pub fn tool_code_blocks(text: &str) -> ToolCodeBlocks<'_> {
    ToolCodeBlocks { rest: text }
}

/// Every call expression inside `<tool_code>` blocks that parses.
pub fn tool_code_calls(text: &str) -> Vec<ParsedCall> {
    tool_code_blocks(text)
        .filter_map(|block| parse_tool_expression(block).into_parsed())
        .collect()
}

pub struct ToolCodeBlocks<'a> {
    rest: &'a str,
}

impl<'a> Iterator for ToolCodeBlocks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let open = self.rest.find(TOOL_CODE_OPEN)?;
        let body_start = open + TOOL_CODE_OPEN.len();
        let Some(close) = self.rest[body_start..].find(TOOL_CODE_CLOSE) else {
            self.rest = "";
            return None;
        };
        let body = &self.rest[body_start..body_start + close];
        self.rest = &self.rest[body_start + close + TOOL_CODE_CLOSE.len()..];
        Some(body)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Number(Number),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Equals,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        let kind = match ch {
            '(' => punct(&mut chars, TokenKind::LParen),
            ')' => punct(&mut chars, TokenKind::RParen),
            '[' => punct(&mut chars, TokenKind::LBracket),
            ']' => punct(&mut chars, TokenKind::RBracket),
            '{' => punct(&mut chars, TokenKind::LBrace),
            '}' => punct(&mut chars, TokenKind::RBrace),
            ',' => punct(&mut chars, TokenKind::Comma),
            ':' => punct(&mut chars, TokenKind::Colon),
            '=' => punct(&mut chars, TokenKind::Equals),
            '"' | '\'' => lex_string(&mut chars, ch),
            '-' | '0'..='9' => lex_number(text, &mut chars),
            c if c == '_' || c.is_alphabetic() => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c == '_' || c.is_alphanumeric() {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                TokenKind::Ident(ident)
            }
            _ => punct(&mut chars, TokenKind::Unknown),
        };
        let end = chars.peek().map(|(idx, _)| *idx).unwrap_or(text.len());
        tokens.push(Token { kind, start, end });
    }

    tokens
}

type CharStream<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn punct(chars: &mut CharStream<'_>, kind: TokenKind) -> TokenKind {
    chars.next();
    kind
}

fn lex_string(chars: &mut CharStream<'_>, quote: char) -> TokenKind {
    chars.next();
    let mut lookahead = chars.clone();
    let mut value = String::new();
    while let Some((_, c)) = lookahead.next() {
        match c {
            c if c == quote => {
                *chars = lookahead;
                return TokenKind::Str(value);
            }
            '\\' => match lookahead.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, c @ ('\\' | '"' | '\'' | '/'))) => value.push(c),
                Some((_, c)) => {
                    value.push('\\');
                    value.push(c);
                }
                None => break,
            },
            c => value.push(c),
        }
    }
    // Unterminated: the quote becomes a stray token and lexing resumes after it.
    TokenKind::Unknown
}

fn lex_number(text: &str, chars: &mut CharStream<'_>) -> TokenKind {
    let Some(&(start, first)) = chars.peek() else {
        return TokenKind::Unknown;
    };
    let mut lookahead = chars.clone();
    lookahead.next();
    if first == '-' && !matches!(lookahead.peek(), Some((_, '0'..='9'))) {
        chars.next();
        return TokenKind::Unknown;
    }

    let mut end = start + first.len_utf8();
    let mut is_float = false;
    let mut previous = first;
    while let Some(&(idx, c)) = lookahead.peek() {
        let accept = match c {
            '0'..='9' => true,
            '.' if !is_float => {
                is_float = true;
                true
            }
            'e' | 'E' => {
                is_float = true;
                true
            }
            '+' | '-' => matches!(previous, 'e' | 'E'),
            _ => false,
        };
        if !accept {
            break;
        }
        previous = c;
        end = idx + c.len_utf8();
        lookahead.next();
    }

    let literal = &text[start..end];
    let number = if is_float {
        literal.parse::<f64>().ok().and_then(Number::from_f64)
    } else {
        literal.parse::<i64>().ok().map(Number::from)
    };
    match number {
        Some(number) => {
            *chars = lookahead;
            TokenKind::Number(number)
        }
        None => {
            chars.next();
            TokenKind::Unknown
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    source: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a TokenKind> {
        self.tokens.get(self.pos).map(|token| &token.kind)
    }

    fn bump(&mut self) -> Option<&'a TokenKind> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(&token.kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Parses `arg, arg, ...)`. Returns `None` when the closing paren is missing.
    fn parse_arguments(&mut self) -> Option<Map<String, JsonValue>> {
        let mut args = Map::new();
        loop {
            match self.peek()? {
                TokenKind::RParen => {
                    self.pos += 1;
                    return Some(args);
                }
                TokenKind::Comma => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }

            let checkpoint = self.pos;
            match self.parse_argument() {
                Some((key, value))
                    if matches!(self.peek(), Some(TokenKind::Comma | TokenKind::RParen)) =>
                {
                    args.insert(key, value);
                }
                _ => {
                    self.pos = checkpoint;
                    self.skip_argument()?;
                }
            }
        }
    }

    fn parse_argument(&mut self) -> Option<(String, JsonValue)> {
        let TokenKind::Ident(key) = self.bump()?.clone() else {
            return None;
        };
        if !self.eat(&TokenKind::Equals) {
            return None;
        }
        let value = self.parse_value()?;
        Some((key, value))
    }

    /// Skips to the next top-level comma or closing paren.
    fn skip_argument(&mut self) -> Option<()> {
        let mut depth = 0usize;
        loop {
            match self.peek()? {
                TokenKind::Comma if depth == 0 => {
                    self.pos += 1;
                    return Some(());
                }
                TokenKind::RParen if depth == 0 => return Some(()),
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn parse_value(&mut self) -> Option<JsonValue> {
        let start = self.pos;
        let value = match self.bump()?.clone() {
            TokenKind::Str(value) => JsonValue::String(value),
            TokenKind::Number(value) => JsonValue::Number(value),
            TokenKind::Ident(word) => match word.as_str() {
                "true" | "True" => JsonValue::Bool(true),
                "false" | "False" => JsonValue::Bool(false),
                "null" | "None" => JsonValue::Null,
                _ => return None,
            },
            TokenKind::LBracket => self
                .parse_array()
                .or_else(|| self.raw_literal(start))?,
            TokenKind::LBrace => self
                .parse_object()
                .or_else(|| self.raw_literal(start))?,
            _ => return None,
        };
        Some(value)
    }

    fn parse_array(&mut self) -> Option<JsonValue> {
        let mut items = Vec::new();
        loop {
            if self.eat(&TokenKind::RBracket) {
                return Some(JsonValue::Array(items));
            }
            items.push(self.parse_value()?);
            if !self.eat(&TokenKind::Comma) && self.peek() != Some(&TokenKind::RBracket) {
                return None;
            }
        }
    }

    fn parse_object(&mut self) -> Option<JsonValue> {
        let mut map = Map::new();
        loop {
            if self.eat(&TokenKind::RBrace) {
                return Some(JsonValue::Object(map));
            }
            let key = match self.bump()? {
                TokenKind::Str(key) | TokenKind::Ident(key) => key.clone(),
                _ => return None,
            };
            if !self.eat(&TokenKind::Colon) {
                return None;
            }
            let value = self.parse_value()?;
            map.insert(key, value);
            if !self.eat(&TokenKind::Comma) && self.peek() != Some(&TokenKind::RBrace) {
                return None;
            }
        }
    }

    /// Keeps a bracketed literal that is not valid data as its source text.
    fn raw_literal(&mut self, start: usize) -> Option<JsonValue> {
        let mut depth = 0usize;
        for idx in start..self.tokens.len() {
            match self.tokens[idx].kind {
                TokenKind::LBracket | TokenKind::LBrace | TokenKind::LParen => depth += 1,
                TokenKind::RBracket | TokenKind::RBrace | TokenKind::RParen => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        self.pos = idx + 1;
                        let raw = &self.source[self.tokens[start].start..self.tokens[idx].end];
                        return Some(JsonValue::String(raw.to_string()));
                    }
                }
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parsed(text: &str) -> ParsedCall {
        match parse_tool_expression(text) {
            ToolExpression::Parsed(call) => call,
            ToolExpression::NotRecognized => panic!("not recognized: {text}"),
        }
    }

    fn render_value(value: &JsonValue) -> String {
        match value {
            JsonValue::String(text) => format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'")),
            JsonValue::Array(items) => format!(
                "[{}]",
                items.iter().map(render_value).collect::<Vec<_>>().join(", ")
            ),
            JsonValue::Object(map) => format!(
                "{{{}}}",
                map.iter()
                    .map(|(key, value)| format!("\"{key}\": {}", render_value(value)))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            other => other.to_string(),
        }
    }

    fn render(name: &str, args: &Map<String, JsonValue>) -> String {
        let args = args
            .iter()
            .map(|(key, value)| format!("{key}={}", render_value(value)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{name}({args})")
    }

    #[test]
    fn parses_literal_kinds() {
        let call = parsed(
            r#"write_file(path="src/a.rs", content='it\'s', mode=644, force=true, owner=null, tags=['a', "b"], meta={'k': 1})"#,
        );
        assert_eq!(call.name, "write_file");
        assert_eq!(
            JsonValue::Object(call.args),
            json!({
                "path": "src/a.rs",
                "content": "it's",
                "mode": 644,
                "force": true,
                "owner": null,
                "tags": ["a", "b"],
                "meta": {"k": 1}
            })
        );
    }

    #[test]
    fn finds_call_inside_surrounding_text() {
        let call = parsed("  default_api.run_command(command='ls -la')\n");
        assert_eq!(call.name, "run_command");
        assert_eq!(call.args["command"], "ls -la");
    }

    #[test]
    fn wrapper_call_yields_nested_call() {
        let call = parsed("print(default_api.read_file(path=\"x\"))");
        assert_eq!(call.name, "read_file");
        assert_eq!(JsonValue::Object(call.args), json!({"path": "x"}));

        let call = parsed("print(default_api.ls())");
        assert_eq!(call.name, "ls");
        assert!(call.args.is_empty());

        // Keyword arguments on the outer call keep it as the call.
        let call = parsed("ls(path=\"src\", depth=max(1, 2))");
        assert_eq!(call.name, "ls");
        assert_eq!(JsonValue::Object(call.args), json!({"path": "src"}));
    }

    #[test]
    fn skips_arguments_outside_grammar() {
        let call = parsed("ls('.', path=\"src\", depth=max(1, 2), hidden=False)");
        assert_eq!(JsonValue::Object(call.args), json!({"path": "src", "hidden": false}));
    }

    #[test]
    fn malformed_bracket_literal_is_kept_as_text() {
        let call = parsed("grep(files=[a.rs, b.rs], pattern=\"x\")");
        assert_eq!(call.args["files"], "[a.rs, b.rs]");
        assert_eq!(call.args["pattern"], "x");
    }

    #[test]
    fn unparseable_text_is_not_recognized() {
        assert_eq!(parse_tool_expression("no call here"), ToolExpression::NotRecognized);
        assert_eq!(parse_tool_expression("read_file(path=\"a\""), ToolExpression::NotRecognized);
        assert_eq!(parse_tool_expression(""), ToolExpression::NotRecognized);
    }

    #[test]
    fn rendered_calls_parse_back() {
        let cases = [
            json!({}),
            json!({"path": "a b/c.txt"}),
            json!({"n": -42, "ok": false, "none": null}),
            json!({"quote": "say \"hi\" it's", "slash": "C:\\tmp"}),
            json!({"items": [1, 2, 3], "names": ["x", "y"]}),
            json!({"nested": {"a": "1", "b": "2"}, "flags": [true, false]}),
            json!({"unicode": "héllo ✓", "empty": "", "list": []}),
        ];
        for case in cases {
            let JsonValue::Object(args) = case else {
                unreachable!()
            };
            let text = render("some_tool", &args);
            let call = parsed(&text);
            assert_eq!(call.name, "some_tool", "{text}");
            assert_eq!(call.args, args, "{text}");
        }
    }

    #[test]
    fn tool_code_blocks_are_non_greedy() {
        let text = "a <tool_code>ls(path='.')</tool_code> b <tool_code>read_file(path=\"x\")</tool_code> <tool_code>broken";
        let blocks: Vec<_> = tool_code_blocks(text).collect();
        assert_eq!(blocks, vec!["ls(path='.')", "read_file(path=\"x\")"]);

        let calls = tool_code_calls(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].name, "read_file");
    }
}
