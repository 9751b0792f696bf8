//! Compiled rule representation.

use std::fmt;

use acgs_types::Verdict;
use serde::{Deserialize, Serialize};

use crate::sexpr::escape;

/// Dotted field path into a proposal payload. A leading `it` segment
/// addresses the current element inside `any` / `all`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path(pub Vec<String>);

impl Path {
    pub fn parse(raw: &str) -> Option<Self> {
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        let valid = segments.iter().all(|s| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });
        let starts_with_letter = raw
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if valid && starts_with_letter {
            Some(Self(segments))
        } else {
            None
        }
    }

    pub fn is_element(&self) -> bool {
        self.0.first().map(|s| s == "it").unwrap_or(false) && self.0.len() > 1
    }

    /// The path relative to the quantified element.
    pub fn element_relative(&self) -> Path {
        Path(self.0[1..].to_vec())
    }

    pub fn last(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

/// Condition expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Bool(bool),
    Num(f64),
    Str(String),
    Field(Path),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Exists(Path),
    In(Path, Vec<Expr>),
    Contains(Path, String),
    Matches(Path, String),
    Any(Path, Box<Expr>),
    All(Path, Box<Expr>),
    Call(String, Vec<Expr>),
    /// Repeats while its condition holds. Always flagged by the safety scan.
    Loop(Box<Expr>),
}

impl Expr {
    /// Visit every node depth-first with its nesting depth.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr, usize)) {
        self.walk_at(0, f);
    }

    fn walk_at<'a>(&'a self, depth: usize, f: &mut impl FnMut(&'a Expr, usize)) {
        f(self, depth);
        match self {
            Expr::Cmp(_, a, b) => {
                a.walk_at(depth + 1, f);
                b.walk_at(depth + 1, f);
            }
            Expr::And(items) | Expr::Or(items) | Expr::Call(_, items) | Expr::In(_, items) => {
                for item in items {
                    item.walk_at(depth + 1, f);
                }
            }
            Expr::Not(inner) | Expr::Loop(inner) | Expr::Any(_, inner) | Expr::All(_, inner) => {
                inner.walk_at(depth + 1, f)
            }
            _ => {}
        }
    }

    pub fn max_depth(&self) -> usize {
        let mut max = 0;
        self.walk(&mut |_, d| max = max.max(d));
        max
    }

    /// Every field path read by this expression.
    pub fn fields(&self) -> Vec<&Path> {
        let mut out = Vec::new();
        self.walk(&mut |e, _| match e {
            Expr::Field(p)
            | Expr::Exists(p)
            | Expr::In(p, _)
            | Expr::Contains(p, _)
            | Expr::Matches(p, _)
            | Expr::Any(p, _)
            | Expr::All(p, _) => out.push(p),
            _ => {}
        });
        out
    }

    /// Root-level field names (first path segment), excluding element paths.
    pub fn root_fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .fields()
            .into_iter()
            .filter(|p| !p.is_element())
            .filter_map(|p| p.0.first().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, head: &str, items: &[Expr]) -> fmt::Result {
            write!(f, "({}", head)?;
            for item in items {
                write!(f, " {}", item)?;
            }
            write!(f, ")")
        }
        match self {
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Num(n) => write!(f, "{}", n),
            Expr::Str(s) => write!(f, "\"{}\"", escape(s)),
            Expr::Field(p) => write!(f, "{}", p),
            Expr::Cmp(op, a, b) => write!(f, "({} {} {})", op.symbol(), a, b),
            Expr::And(items) => list(f, "and", items),
            Expr::Or(items) => list(f, "or", items),
            Expr::Not(inner) => write!(f, "(not {})", inner),
            Expr::Exists(p) => write!(f, "(exists {})", p),
            Expr::In(p, items) => list(f, &format!("in {}", p), items),
            Expr::Contains(p, s) => write!(f, "(contains {} \"{}\")", p, escape(s)),
            Expr::Matches(p, s) => write!(f, "(matches {} \"{}\")", p, escape(s)),
            Expr::Any(p, inner) => write!(f, "(any {} {})", p, inner),
            Expr::All(p, inner) => write!(f, "(all {} {})", p, inner),
            Expr::Call(name, args) => list(f, &format!("call {}", name), args),
            Expr::Loop(inner) => write!(f, "(loop {})", inner),
        }
    }
}

/// A rule that parsed and compiled cleanly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledRule {
    pub name: String,
    pub condition: Expr,
    pub verdict: Verdict,
    pub explanation: String,
}

impl CompiledRule {
    pub fn new(
        name: impl Into<String>,
        condition: Expr,
        verdict: Verdict,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            condition,
            verdict,
            explanation: explanation.into(),
        }
    }

    /// Canonical text form; compiles back to an equal rule.
    pub fn render(&self) -> String {
        format!(
            "(rule {} (when {}) (then {} \"{}\"))",
            self.name,
            self.condition,
            self.verdict,
            escape(&self.explanation)
        )
    }
}
