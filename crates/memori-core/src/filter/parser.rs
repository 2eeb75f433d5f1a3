//! Filter Parser
//!
//! Turns an infix filter expression into a `FilterNode` tree, and
//! instantiates named templates with `{param}` placeholders.

use std::collections::BTreeMap;

use crate::error::{MemoriError, Result};
use crate::filter::{ComparisonOp, FilterNode, FilterValue, LogicalOp, Operator};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Op(String),
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    And,
    Or,
    Not,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            source,
        }
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>> {
        let mut tokens = Vec::new();
        while let Some(&(pos, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.chars.next();
                continue;
            }
            match ch {
                '(' => {
                    self.chars.next();
                    tokens.push((Token::LParen, pos));
                }
                ')' => {
                    self.chars.next();
                    tokens.push((Token::RParen, pos));
                }
                '[' => {
                    self.chars.next();
                    tokens.push((Token::LBracket, pos));
                }
                ']' => {
                    self.chars.next();
                    tokens.push((Token::RBracket, pos));
                }
                ',' => {
                    self.chars.next();
                    tokens.push((Token::Comma, pos));
                }
                '"' | '\'' => {
                    let quote = ch;
                    self.chars.next();
                    let start = pos + 1;
                    let mut end = start;
                    let mut closed = false;
                    for (p, c) in self.chars.by_ref() {
                        if c == quote {
                            end = p;
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(MemoriError::parse("unterminated string literal", &self.source[pos..], pos));
                    }
                    tokens.push((Token::String(self.source[start..end].to_string()), pos));
                }
                '=' | '!' | '>' | '<' | '~' => {
                    let start = pos;
                    self.chars.next();
                    let mut op = ch.to_string();
                    if let Some(&(_, next)) = self.chars.peek() {
                        if next == '=' && ch != '~' {
                            op.push(next);
                            self.chars.next();
                        }
                    }
                    tokens.push((Token::Op(op), start));
                }
                c if c.is_ascii_digit() || (c == '-' && self.peek_is_digit()) => {
                    let start = pos;
                    let mut end = pos;
                    if c == '-' {
                        self.chars.next();
                        if let Some(&(p, _)) = self.chars.peek() {
                            end = p;
                        }
                    }
                    while let Some(&(p, c)) = self.chars.peek() {
                        if c.is_ascii_digit() || c == '.' {
                            end = p + c.len_utf8();
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    let text = &self.source[start..end];
                    let value: f64 = text
                        .parse()
                        .map_err(|_| MemoriError::parse("invalid numeric literal", text, start))?;
                    tokens.push((Token::Number(value), start));
                }
                c if c.is_alphabetic() || c == '_' => {
                    let start = pos;
                    let mut end = pos;
                    while let Some(&(p, c)) = self.chars.peek() {
                        if c.is_alphanumeric() || c == '_' || c == '.' {
                            end = p + c.len_utf8();
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    let text = &self.source[start..end];
                    let token = match text.to_uppercase().as_str() {
                        "AND" => Token::And,
                        "OR" => Token::Or,
                        "NOT" => Token::Not,
                        "TRUE" => Token::Bool(true),
                        "FALSE" => Token::Bool(false),
                        "NULL" => Token::Null,
                        "CONTAINS" | "STARTS_WITH" | "ENDS_WITH" => Token::Op(text.to_lowercase()),
                        _ => Token::Ident(text.to_string()),
                    };
                    tokens.push((token, start));
                }
                _ => {
                    return Err(MemoriError::parse(
                        format!("unexpected character '{ch}'"),
                        &self.source[pos..(pos + ch.len_utf8()).min(self.source.len())],
                        pos,
                    ));
                }
            }
        }
        Ok(tokens)
    }

    fn peek_is_digit(&mut self) -> bool {
        let mut clone = self.chars.clone();
        clone.next();
        matches!(clone.peek(), Some((_, c)) if c.is_ascii_digit())
    }
}

/// Recursive-descent parser over the tokenized filter grammar.
pub struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    source_len: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self { tokens, pos: 0, source_len: source.len() })
    }

    /// Parses a complete filter expression, failing if any input remains.
    pub fn parse(source: &str) -> Result<FilterNode> {
        let result = (|| {
            let mut parser = Self::new(source)?;
            let node = parser.parse_expr()?;
            if parser.pos != parser.tokens.len() {
                let (_, pos) = &parser.tokens[parser.pos];
                return Err(MemoriError::parse("unexpected trailing input", "", *pos));
            }
            Ok(node)
        })();
        if let Err(ref e) = result {
            tracing::debug!(source, error = %e, "filter parse failed");
        }
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_pos(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, p)| *p).unwrap_or(self.source_len)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn parse_expr(&mut self) -> Result<FilterNode> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<FilterNode> {
        let mut children = vec![self.parse_and()?];
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            children.push(self.parse_and()?);
        }
        if children.len() == 1 {
            Ok(children.pop().unwrap())
        } else {
            Ok(FilterNode::or(children))
        }
    }

    fn parse_and(&mut self) -> Result<FilterNode> {
        let mut children = vec![self.parse_not()?];
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            children.push(self.parse_not()?);
        }
        if children.len() == 1 {
            Ok(children.pop().unwrap())
        } else {
            Ok(FilterNode::and(children))
        }
    }

    fn parse_not(&mut self) -> Result<FilterNode> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let child = self.parse_atom()?;
            Ok(FilterNode::not(child))
        } else {
            self.parse_atom()
        }
    }

    fn parse_atom(&mut self) -> Result<FilterNode> {
        match self.peek() {
            Some(Token::LParen) => {
                self.advance();
                let node = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(node),
                    _ => Err(MemoriError::parse("expected closing parenthesis", "", self.peek_pos())),
                }
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<FilterNode> {
        let pos = self.peek_pos();
        let field = match self.advance() {
            Some(Token::Ident(name)) => name,
            other => {
                return Err(MemoriError::parse(
                    format!("expected field identifier, found {other:?}"),
                    "",
                    pos,
                ))
            }
        };

        let op_pos = self.peek_pos();
        let op_text = match self.advance() {
            Some(Token::Op(op)) => op,
            other => {
                return Err(MemoriError::parse(
                    format!("expected operator, found {other:?}"),
                    &field,
                    op_pos,
                ))
            }
        };

        let operator = match op_text.as_str() {
            "=" => ComparisonOp::Eq,
            "!=" => ComparisonOp::Ne,
            ">" => ComparisonOp::Gt,
            "<" => ComparisonOp::Lt,
            ">=" => ComparisonOp::Ge,
            "<=" => ComparisonOp::Le,
            "~" => ComparisonOp::Like,
            "contains" => ComparisonOp::Contains,
            "starts_with" => ComparisonOp::StartsWith,
            "ends_with" => ComparisonOp::EndsWith,
            other => {
                return Err(MemoriError::parse(format!("unrecognized operator '{other}'"), &field, op_pos))
            }
        };

        let value = self.parse_value()?;

        Ok(FilterNode::comparison(field, operator, value))
    }

    fn parse_value(&mut self) -> Result<FilterValue> {
        let pos = self.peek_pos();
        match self.advance() {
            Some(Token::String(s)) => Ok(FilterValue::String(s)),
            Some(Token::Number(n)) => Ok(FilterValue::Number(n)),
            Some(Token::Bool(b)) => Ok(FilterValue::Bool(b)),
            Some(Token::Null) => Ok(FilterValue::Null),
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !matches!(self.peek(), Some(Token::RBracket)) {
                    loop {
                        items.push(self.parse_value()?);
                        if matches!(self.peek(), Some(Token::Comma)) {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                match self.advance() {
                    Some(Token::RBracket) => Ok(FilterValue::Array(items)),
                    _ => Err(MemoriError::parse("expected closing bracket", "", pos)),
                }
            }
            other => Err(MemoriError::parse(format!("expected value, found {other:?}"), "", pos)),
        }
    }
}

/// A named filter template with `{param}` placeholders, instantiated by
/// string substitution before re-parsing.
#[derive(Debug, Clone)]
pub struct FilterTemplate {
    pub name: String,
    pub expression: String,
    pub params: Vec<TemplateParam>,
}

#[derive(Debug, Clone)]
pub struct TemplateParam {
    pub name: String,
    pub required: bool,
    pub default: Option<String>,
}

impl FilterTemplate {
    /// Substitutes each `{param}` placeholder with its bound value (or
    /// default), then parses the result.
    pub fn instantiate(&self, bindings: &BTreeMap<String, String>) -> Result<FilterNode> {
        let mut expression = self.expression.clone();
        for param in &self.params {
            let placeholder = format!("{{{}}}", param.name);
            let value = bindings
                .get(&param.name)
                .cloned()
                .or_else(|| param.default.clone());
            let value = match value {
                Some(v) => v,
                None if param.required => {
                    return Err(MemoriError::validation(
                        param.name.clone(),
                        "<missing>",
                        "required template parameter",
                    ))
                }
                None => String::new(),
            };
            expression = expression.replace(&placeholder, &value);
        }
        Parser::parse(&expression)
    }
}
