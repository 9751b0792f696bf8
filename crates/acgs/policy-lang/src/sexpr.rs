//! S-expression reader for rule bodies.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compiler::MAX_COMPILE_DEPTH;
use crate::error::PolicyLangError;

/// Deepest list nesting the reader accepts. Leaves room for the `rule` and
/// `when` wrappers around a condition at the compile ceiling.
pub const MAX_READ_DEPTH: usize = MAX_COMPILE_DEPTH * 2;

/// Longest rule body, in bytes, the reader accepts.
pub const MAX_INPUT_BYTES: usize = 64 * 1024;

/// An S-expression node.
///
/// Rule bodies use S-expressions as their textual form. Atoms cover
/// symbols and numbers; string literals are kept distinct so that
/// `"deny"` and `deny` never compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SExpr {
    Atom(String),
    Str(String),
    List(Vec<SExpr>),
}

impl SExpr {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExpr::Atom(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExpr::Atom(s) => write!(f, "{}", s),
            SExpr::Str(s) => write!(f, "\"{}\"", escape(s)),
            SExpr::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

pub(crate) fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Atom(String),
    Str(String),
}

/// Parse exactly one S-expression.
///
/// `;` starts a comment running to the end of the line.
pub fn parse_sexpr(input: &str) -> Result<SExpr, PolicyLangError> {
    if input.len() > MAX_INPUT_BYTES {
        return Err(PolicyLangError::Parse(format!(
            "input of {} bytes exceeds the {} byte limit",
            input.len(),
            MAX_INPUT_BYTES
        )));
    }
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(PolicyLangError::Parse("empty input".into()));
    }
    let (expr, rest) = parse_tokens(&tokens, 0)?;
    if !rest.is_empty() {
        return Err(PolicyLangError::Parse(format!(
            "unexpected trailing tokens after expression ({} left)",
            rest.len()
        )));
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<Token>, PolicyLangError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            ';' => {
                while let Some(&(_, c)) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => s.push('\n'),
                            Some((_, other)) => s.push(other),
                            None => break,
                        },
                        other => s.push(other),
                    }
                }
                if !closed {
                    return Err(PolicyLangError::Parse(format!(
                        "unterminated string starting at offset {}",
                        pos
                    )));
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut atom = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c == '(' || c == ')' || c == '"' || c == ';' || c.is_whitespace() {
                        break;
                    }
                    atom.push(c);
                    chars.next();
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }

    Ok(tokens)
}

fn parse_tokens(tokens: &[Token], depth: usize) -> Result<(SExpr, &[Token]), PolicyLangError> {
    match tokens.first() {
        None => Err(PolicyLangError::Parse("unexpected end of input".into())),
        Some(Token::Open) if depth >= MAX_READ_DEPTH => Err(PolicyLangError::Parse(format!(
            "lists nested deeper than {} levels",
            MAX_READ_DEPTH
        ))),
        Some(Token::Open) => {
            let mut rest = &tokens[1..];
            let mut items = Vec::new();
            loop {
                match rest.first() {
                    None => {
                        return Err(PolicyLangError::Parse(
                            "unbalanced parentheses: missing ')'".into(),
                        ))
                    }
                    Some(Token::Close) => {
                        rest = &rest[1..];
                        break;
                    }
                    Some(_) => {
                        let (item, new_rest) = parse_tokens(rest, depth + 1)?;
                        items.push(item);
                        rest = new_rest;
                    }
                }
            }
            Ok((SExpr::List(items), rest))
        }
        Some(Token::Close) => Err(PolicyLangError::Parse("unexpected ')'".into())),
        Some(Token::Atom(a)) => Ok((SExpr::Atom(a.clone()), &tokens[1..])),
        Some(Token::Str(s)) => Ok((SExpr::Str(s.clone()), &tokens[1..])),
    }
}
