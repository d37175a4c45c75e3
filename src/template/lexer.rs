//! Pattern tokenizer.
//!
//! A pattern is split once into literal text and `{{ ... }}` tokens. A token body is
//! parsed into a seed expression followed by zero or more `| filter(args)` calls.
//! Quoted strings are honored everywhere, so a `|` or `}}` inside quotes never ends a
//! token or a call.

use std::fmt;

/// Argument or seed of a filter chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Number(String),
    Bool(bool),
    Null,
    /// Path or alias resolved against the rendering scope.
    Var(String),
}

/// One `name(args)` step of a filter chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
}

/// Token of the form `{{ seed | f1(...) | f2 }}`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    /// Full token text, braces included.
    pub source: String,
    pub seed: Expr,
    pub calls: Vec<FilterCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    /// Token of the form `{{ name }}`, substituted verbatim.
    Replace { source: String, name: String },
    Chain(FilterChain),
}

impl Node {
    /// Token text as written, for token nodes.
    pub fn token_source(&self) -> Option<&str> {
        match self {
            Node::Text(_) => None,
            Node::Replace { source, .. } => Some(source),
            Node::Chain(chain) => Some(&chain.source),
        }
    }
}

/// Error type for pattern parsing
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateError {
    Unclosed { position: usize },
    EmptyToken { position: usize },
    InvalidToken { token: String, reason: String },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Unclosed { position } => {
                write!(f, "Unclosed token starting at byte {}", position)
            }
            TemplateError::EmptyToken { position } => {
                write!(f, "Empty token at byte {}", position)
            }
            TemplateError::InvalidToken { token, reason } => {
                write!(f, "Invalid token '{}': {}", token, reason)
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// Split a pattern into nodes.
pub fn parse(pattern: &str) -> Result<Vec<Node>, TemplateError> {
    let mut nodes = Vec::new();
    let mut rest = pattern;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            push_text(&mut nodes, &rest[..start]);
        }
        let body_start = start + 2;
        let end = find_token_end(&rest[body_start..])
            .ok_or(TemplateError::Unclosed { position: offset + start })?;
        let body = &rest[body_start..body_start + end];
        let source = &rest[start..body_start + end + 2];
        nodes.push(parse_token(source, body, offset + start)?);

        let consumed = body_start + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    if !rest.is_empty() {
        push_text(&mut nodes, rest);
    }
    Ok(nodes)
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if let Some(Node::Text(previous)) = nodes.last_mut() {
        previous.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

/// Byte offset of the closing `}}`, skipping quoted sections.
fn find_token_end(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'"' || b == b'\'' {
                    quote = Some(b);
                } else if b == b'}' && bytes.get(i + 1) == Some(&b'}') {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

fn parse_token(source: &str, body: &str, position: usize) -> Result<Node, TemplateError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(TemplateError::EmptyToken { position });
    }

    let invalid = |reason: String| TemplateError::InvalidToken {
        token: source.to_string(),
        reason,
    };

    let tokens = tokenize(trimmed).map_err(invalid)?;
    let mut parser = Parser { tokens, pos: 0 };
    let seed = parser.expr().map_err(invalid)?;
    let mut calls = Vec::new();
    while parser.eat(&Tok::Pipe) {
        calls.push(parser.call().map_err(invalid)?);
    }
    if let Some(tok) = parser.peek() {
        return Err(invalid(format!("unexpected {}", tok)));
    }

    match (seed, calls.is_empty()) {
        (Expr::Var(name), true) => Ok(Node::Replace {
            source: source.to_string(),
            name,
        }),
        (seed, _) => Ok(Node::Chain(FilterChain {
            source: source.to_string(),
            seed,
            calls,
        })),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Str(String),
    Word(String),
    Pipe,
    Open,
    Close,
    Comma,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Str(s) => write!(f, "string '{}'", s),
            Tok::Word(w) => write!(f, "'{}'", w),
            Tok::Pipe => f.write_str("'|'"),
            Tok::Open => f.write_str("'('"),
            Tok::Close => f.write_str("')'"),
            Tok::Comma => f.write_str("','"),
        }
    }
}

fn tokenize(body: &str) -> Result<Vec<Tok>, String> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Tok::Pipe);
            }
            '(' => {
                chars.next();
                tokens.push(Tok::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Tok::Close);
            }
            ',' => {
                chars.next();
                tokens.push(Tok::Comma);
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    if ch == '\\' {
                        if let Some(escaped) = chars.next() {
                            text.push(escaped);
                        }
                    } else if ch == c {
                        closed = true;
                        break;
                    } else {
                        text.push(ch);
                    }
                }
                if !closed {
                    return Err("unterminated string".to_string());
                }
                tokens.push(Tok::Str(text));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '|' | '(' | ')' | ',' | '"' | '\'') {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Tok::Word(word));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Tok) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::Word(w)) => Ok(word_to_expr(w)),
            Some(other) => Err(format!("expected a value, found {}", other)),
            None => Err("expected a value".to_string()),
        }
    }

    fn call(&mut self) -> Result<FilterCall, String> {
        let name = match self.next() {
            Some(Tok::Word(w)) => w,
            Some(other) => return Err(format!("expected a filter name, found {}", other)),
            None => return Err("expected a filter name after '|'".to_string()),
        };

        let mut args = Vec::new();
        if self.eat(&Tok::Open) {
            if !self.eat(&Tok::Close) {
                loop {
                    args.push(self.expr()?);
                    if self.eat(&Tok::Close) {
                        break;
                    }
                    if !self.eat(&Tok::Comma) {
                        return Err(format!("expected ',' or ')' in arguments of '{}'", name));
                    }
                }
            }
        }
        Ok(FilterCall { name, args })
    }
}

fn word_to_expr(word: String) -> Expr {
    match word.as_str() {
        "true" => Expr::Bool(true),
        "false" => Expr::Bool(false),
        "null" => Expr::Null,
        _ if is_number(&word) => Expr::Number(word),
        _ => Expr::Var(word),
    }
}

fn is_number(word: &str) -> bool {
    let digits = word.strip_prefix('-').unwrap_or(word);
    !digits.is_empty()
        && digits.chars().next().is_some_and(|c| c.is_ascii_digit())
        && digits.parse::<f64>().is_ok()
}

/// Content of a pattern made of a single quoted literal, if it is one.
///
/// A backslash escapes the next character, as in string arguments of tokens.
pub fn quoted_literal(pattern: &str) -> Option<String> {
    let trimmed = pattern.trim();
    let mut chars = trimmed.chars();
    let quote = chars.next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }

    let mut inner = String::new();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            inner.push(chars.next()?);
        } else if ch == quote {
            return chars.as_str().is_empty().then_some(inner);
        } else {
            inner.push(ch);
        }
    }
    None
}

/// Quote `text` so that [`quoted_literal`] gives it back.
pub fn quote_literal(text: &str) -> String {
    let quote = if text.contains('"') && !text.contains('\'') { '\'' } else { '"' };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for ch in text.chars() {
        if ch == quote || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_and_replace() {
        let nodes = parse("Title: {{ value }}!").unwrap();

        assert_eq!(
            nodes,
            vec![
                Node::Text("Title: ".to_string()),
                Node::Replace {
                    source: "{{ value }}".to_string(),
                    name: "value".to_string()
                },
                Node::Text("!".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_filter_chain() {
        let nodes = parse("{{ value|trim|replace('a', \"b|c\")|slice(0, 4) }}").unwrap();

        let Node::Chain(chain) = &nodes[0] else {
            panic!("expected a filter chain");
        };
        assert_eq!(chain.seed, Expr::Var("value".to_string()));
        let names: Vec<&str> = chain.calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["trim", "replace", "slice"]);
        assert_eq!(
            chain.calls[1].args,
            vec![Expr::Str("a".to_string()), Expr::Str("b|c".to_string())]
        );
        assert_eq!(
            chain.calls[2].args,
            vec![Expr::Number("0".to_string()), Expr::Number("4".to_string())]
        );
    }

    #[test]
    fn test_quoted_braces_do_not_close_token() {
        let nodes = parse("{{ value|default('}}') }}x").unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1], Node::Text("x".to_string()));
    }

    #[test]
    fn test_literal_seed_is_chain() {
        let nodes = parse("{{ 'fixed' }}").unwrap();
        assert!(matches!(&nodes[0], Node::Chain(chain) if chain.seed == Expr::Str("fixed".to_string())));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("a {{ value"), Err(TemplateError::Unclosed { position: 2 })));
        assert!(matches!(parse("{{ }}"), Err(TemplateError::EmptyToken { .. })));
        assert!(matches!(parse("{{ value | }}"), Err(TemplateError::InvalidToken { .. })));
        assert!(matches!(parse("{{ value|slice(1 }}"), Err(TemplateError::InvalidToken { .. })));
        assert!(matches!(parse("{{ 'open }}"), Err(TemplateError::Unclosed { .. })));
    }

    #[test]
    fn test_quoted_literal() {
        assert_eq!(quoted_literal("\"Hello\"").as_deref(), Some("Hello"));
        assert_eq!(quoted_literal(" 'x' ").as_deref(), Some("x"));
        assert_eq!(quoted_literal("'a' ~ 'b'"), None);
        assert_eq!(quoted_literal("plain"), None);
        assert_eq!(quoted_literal("'"), None);
        assert_eq!(quoted_literal(r#""it's \"x\"""#).as_deref(), Some("it's \"x\""));
        assert_eq!(quoted_literal(r#""a\\b""#).as_deref(), Some("a\\b"));
        assert_eq!(quoted_literal(r#""open\""#), None);
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("CC BY"), "\"CC BY\"");
        assert_eq!(quote_literal("say \"hi\""), "'say \"hi\"'");
        for text in ["it's \"x\"", "a\\b", "", "'", "\\"] {
            assert_eq!(quoted_literal(&quote_literal(text)).as_deref(), Some(text), "{}", text);
        }
    }
}
