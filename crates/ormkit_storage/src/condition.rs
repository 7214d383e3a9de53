//! Condition fragment parsing and evaluation for the reference backend.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! expr      := and ("OR" and)*
//! and       := unary ("AND" unary)*
//! unary     := "NOT" unary | "(" expr ")" | predicate
//! predicate := column ( cmp operand
//!                     | "IS" ["NOT"] "NULL"
//!                     | ["NOT"] "IN" "(" operand ("," operand)* ")"
//!                     | ["NOT"] "LIKE" operand )
//! cmp       := "=" | "!=" | "<>" | "<" | "<=" | ">" | ">="
//! operand   := "?" | integer | 'text' | TRUE | FALSE | NULL
//! column    := identifier | `quoted identifier`
//! ```
//!
//! Placeholders are bound left to right when the fragment is compiled.

use crate::error::{StorageError, StorageResult};
use crate::value::{Record, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Text(String),
    Integer(i64),
    Placeholder,
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> StorageResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '?' => {
                tokens.push(Token::Placeholder);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op("="));
                i += 1;
            }
            '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let op = match (c, next) {
                    ('!', Some('=')) | ('<', Some('>')) => "!=",
                    ('<', Some('=')) => "<=",
                    ('>', Some('=')) => ">=",
                    ('<', _) => "<",
                    ('>', _) => ">",
                    _ => {
                        return Err(StorageError::invalid_condition(format!(
                            "unexpected character '{c}' in '{input}'"
                        )))
                    }
                };
                i += if op.len() == 2 { 2 } else { 1 };
                tokens.push(Token::Op(op));
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .map(|p| start + p)
                    .ok_or_else(|| {
                        StorageError::invalid_condition(format!("unterminated identifier in '{input}'"))
                    })?;
                tokens.push(Token::Ident(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '\'' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            text.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(StorageError::invalid_condition(format!(
                                "unterminated string in '{input}'"
                            )))
                        }
                    }
                }
                tokens.push(Token::Text(text));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(char::is_ascii_digit) {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal.parse::<i64>().map_err(|e| {
                    StorageError::invalid_condition(format!("bad integer '{literal}': {e}"))
                })?;
                tokens.push(Token::Integer(value));
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_alphanumeric() || *ch == '_' || *ch == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(StorageError::invalid_condition(format!(
                    "unexpected character '{other}' in '{input}'"
                )))
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "=" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            _ => return None,
        })
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Compare {
        column: String,
        op: CmpOp,
        operand: Value,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    In {
        column: String,
        items: Vec<Value>,
        negated: bool,
    },
    Like {
        column: String,
        pattern: Value,
        negated: bool,
    },
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    params: &'a [Value],
    next_param: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str) -> StorageError {
        StorageError::invalid_condition(format!("{message} in '{}'", self.source))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> StorageResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {keyword}")))
        }
    }

    fn expect(&mut self, expected: &Token) -> StorageResult<()> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            _ => Err(self.error(&format!("expected {expected:?}"))),
        }
    }

    fn parse_expr(&mut self) -> StorageResult<Node> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> StorageResult<Node> {
        let mut left = self.parse_unary()?;
        while self.eat_keyword("AND") {
            let right = self.parse_unary()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> StorageResult<Node> {
        if self.eat_keyword("NOT") {
            return Ok(Node::Not(Box::new(self.parse_unary()?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_expr()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> StorageResult<Node> {
        let column = match self.advance() {
            Some(Token::Ident(name)) => name,
            _ => return Err(self.error("expected column name")),
        };

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Node::IsNull { column, negated });
        }

        let negated = self.eat_keyword("NOT");
        if self.eat_keyword("IN") {
            self.expect(&Token::LParen)?;
            let mut items = Vec::new();
            loop {
                match self.parse_operand()? {
                    Value::List(values) => items.extend(values),
                    value => items.push(value),
                }
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    continue;
                }
                break;
            }
            self.expect(&Token::RParen)?;
            return Ok(Node::In {
                column,
                items,
                negated,
            });
        }
        if self.eat_keyword("LIKE") {
            let pattern = self.parse_operand()?;
            return Ok(Node::Like {
                column,
                pattern,
                negated,
            });
        }
        if negated {
            return Err(self.error("expected IN or LIKE after NOT"));
        }

        let op = match self.advance() {
            Some(Token::Op(symbol)) => {
                CmpOp::from_symbol(symbol).ok_or_else(|| self.error("unknown operator"))?
            }
            _ => return Err(self.error("expected comparison operator")),
        };
        let operand = self.parse_operand()?;
        Ok(Node::Compare {
            column,
            op,
            operand,
        })
    }

    fn parse_operand(&mut self) -> StorageResult<Value> {
        match self.advance() {
            Some(Token::Placeholder) => {
                let value = self.params.get(self.next_param).cloned().ok_or(
                    StorageError::PlaceholderMismatch {
                        placeholders: self.next_param + 1,
                        bound: self.params.len(),
                    },
                )?;
                self.next_param += 1;
                Ok(value)
            }
            Some(Token::Integer(v)) => Ok(Value::Integer(v)),
            Some(Token::Text(v)) => Ok(Value::Text(v)),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("TRUE") => Ok(Value::Bool(true)),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("FALSE") => {
                Ok(Value::Bool(false))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("NULL") => Ok(Value::Null),
            _ => Err(self.error("expected operand")),
        }
    }
}

/// Counts the `?` placeholder tokens in `source`.
///
/// Question marks inside quoted text or identifiers are not placeholders.
/// A fragment that does not tokenize falls back to a raw character count;
/// compiling it fails later either way.
pub(crate) fn placeholder_count(source: &str) -> usize {
    tokenize(source).map_or_else(
        |_| source.matches('?').count(),
        |tokens| tokens.iter().filter(|t| **t == Token::Placeholder).count(),
    )
}

/// A parsed condition with its placeholders already bound.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition {
    root: Node,
}

impl CompiledCondition {
    /// Parses `source` and binds `params` to its placeholders in order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidCondition`] for malformed fragments and
    /// [`StorageError::PlaceholderMismatch`] when the number of values does
    /// not match the number of placeholders.
    pub fn compile(source: &str, params: &[Value]) -> StorageResult<Self> {
        let mut parser = Parser {
            tokens: tokenize(source)?,
            pos: 0,
            params,
            next_param: 0,
            source,
        };
        let root = parser.parse_expr()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        if parser.next_param != params.len() {
            return Err(StorageError::PlaceholderMismatch {
                placeholders: parser.next_param,
                bound: params.len(),
            });
        }
        Ok(Self { root })
    }

    /// Evaluates the condition against a record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        eval(&self.root, record)
    }
}

fn field<'r>(record: &'r Record, column: &str) -> &'r Value {
    // Qualified names such as `o.name` address the bare field.
    let name = column.rsplit('.').next().unwrap_or(column);
    record.get(name).unwrap_or(&Value::Null)
}

fn eval(node: &Node, record: &Record) -> bool {
    match node {
        Node::And(a, b) => eval(a, record) && eval(b, record),
        Node::Or(a, b) => eval(a, record) || eval(b, record),
        Node::Not(inner) => !eval(inner, record),
        Node::Compare {
            column,
            op,
            operand,
        } => field(record, column)
            .compare(operand)
            .is_some_and(|ordering| op.holds(ordering)),
        Node::IsNull { column, negated } => field(record, column).is_null() != *negated,
        Node::In {
            column,
            items,
            negated,
        } => {
            let value = field(record, column);
            if value.is_null() {
                return false;
            }
            items.contains(value) != *negated
        }
        Node::Like {
            column,
            pattern,
            negated,
        } => match (field(record, column), pattern) {
            (Value::Text(text), Value::Text(pattern)) => like(text, pattern) != *negated,
            _ => false,
        },
    }
}

/// SQL `LIKE` with `%` and `_` wildcards, case-sensitive.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // matched[j]: pattern[..j] matches the text prefix consumed so far.
    let mut matched = vec![false; pattern.len() + 1];
    matched[0] = true;
    for j in 1..=pattern.len() {
        matched[j] = matched[j - 1] && pattern[j - 1] == '%';
    }

    for &ch in &text {
        let mut next = vec![false; pattern.len() + 1];
        for j in 1..=pattern.len() {
            next[j] = match pattern[j - 1] {
                '%' => next[j - 1] || matched[j],
                '_' => matched[j - 1],
                p => matched[j - 1] && p == ch,
            };
        }
        matched = next;
    }

    matched[pattern.len()]
}
