//! Grammar check and compilation from S-expressions to [`CompiledRule`].
//!
//! ```text
//! (rule <name>
//!   (when <condition>)
//!   (then <deny|warn|allow> "<explanation>"))
//! ```

use acgs_types::Verdict;

use crate::ast::{CmpOp, CompiledRule, Expr, Path};
use crate::error::PolicyLangError;
use crate::sexpr::{parse_sexpr, SExpr};

/// Hard nesting ceiling enforced at compile time.
pub const MAX_COMPILE_DEPTH: usize = 64;

/// Parse and compile rule text.
pub fn compile_rule(text: &str) -> Result<CompiledRule, PolicyLangError> {
    let sexpr = parse_sexpr(text)?;
    compile_sexpr(&sexpr)
}

/// Compile a standalone condition, e.g. a principle's formal spec.
pub fn compile_condition(text: &str) -> Result<Expr, PolicyLangError> {
    let sexpr = parse_sexpr(text)?;
    compile_expr(&sexpr, 0)
}

pub fn compile_sexpr(sexpr: &SExpr) -> Result<CompiledRule, PolicyLangError> {
    let items = match sexpr {
        SExpr::List(items) => items,
        other => {
            return Err(PolicyLangError::Compile(format!(
                "expected (rule ...), found {}",
                other
            )))
        }
    };
    if items.first().and_then(SExpr::as_atom) != Some("rule") {
        return Err(PolicyLangError::Compile("rule must start with 'rule'".into()));
    }
    let name = items
        .get(1)
        .and_then(SExpr::as_atom)
        .ok_or_else(|| PolicyLangError::Compile("rule name must be a symbol".into()))?;

    let mut condition = None;
    let mut outcome = None;
    for clause in &items[2..] {
        let parts = match clause {
            SExpr::List(parts) => parts,
            other => {
                return Err(PolicyLangError::Compile(format!(
                    "unexpected clause {}",
                    other
                )))
            }
        };
        match parts.first().and_then(SExpr::as_atom) {
            Some("when") => {
                if condition.is_some() {
                    return Err(PolicyLangError::Compile("duplicate 'when' clause".into()));
                }
                if parts.len() != 2 {
                    return Err(PolicyLangError::Compile(
                        "'when' takes exactly one condition".into(),
                    ));
                }
                condition = Some(compile_expr(&parts[1], 0)?);
            }
            Some("then") => {
                if outcome.is_some() {
                    return Err(PolicyLangError::Compile("duplicate 'then' clause".into()));
                }
                outcome = Some(compile_then(&parts[1..])?);
            }
            Some(other) => {
                return Err(PolicyLangError::Compile(format!("unknown clause '{}'", other)))
            }
            None => return Err(PolicyLangError::Compile("empty clause".into())),
        }
    }

    let condition =
        condition.ok_or_else(|| PolicyLangError::Compile("missing 'when' clause".into()))?;
    let (verdict, explanation) =
        outcome.ok_or_else(|| PolicyLangError::Compile("missing 'then' clause".into()))?;
    Ok(CompiledRule::new(name, condition, verdict, explanation))
}

fn compile_then(parts: &[SExpr]) -> Result<(Verdict, String), PolicyLangError> {
    let verdict = parts
        .first()
        .and_then(SExpr::as_atom)
        .and_then(Verdict::parse)
        .ok_or_else(|| {
            PolicyLangError::Compile("'then' needs a verdict: deny, warn or allow".into())
        })?;
    let explanation = match parts.get(1) {
        Some(SExpr::Str(s)) => s.clone(),
        None => String::new(),
        Some(other) => {
            return Err(PolicyLangError::Compile(format!(
                "explanation must be a string, found {}",
                other
            )))
        }
    };
    if parts.len() > 2 {
        return Err(PolicyLangError::Compile("'then' takes at most two arguments".into()));
    }
    Ok((verdict, explanation))
}

fn path_arg(s: Option<&SExpr>, op: &str) -> Result<Path, PolicyLangError> {
    s.and_then(SExpr::as_atom)
        .and_then(Path::parse)
        .ok_or_else(|| PolicyLangError::Compile(format!("'{}' expects a field path", op)))
}

fn string_arg(s: Option<&SExpr>, op: &str) -> Result<String, PolicyLangError> {
    match s {
        Some(SExpr::Str(v)) => Ok(v.clone()),
        _ => Err(PolicyLangError::Compile(format!("'{}' expects a string literal", op))),
    }
}

fn arity(op: &str, args: &[SExpr], expected: usize) -> Result<(), PolicyLangError> {
    if args.len() != expected {
        return Err(PolicyLangError::Compile(format!(
            "'{}' takes {} argument(s), got {}",
            op,
            expected,
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn compile_expr(sexpr: &SExpr, depth: usize) -> Result<Expr, PolicyLangError> {
    if depth > MAX_COMPILE_DEPTH {
        return Err(PolicyLangError::Compile(format!(
            "expression nested deeper than {}",
            MAX_COMPILE_DEPTH
        )));
    }
    match sexpr {
        SExpr::Str(s) => Ok(Expr::Str(s.clone())),
        SExpr::Atom(a) => match a.as_str() {
            "true" => Ok(Expr::Bool(true)),
            "false" => Ok(Expr::Bool(false)),
            _ => {
                if let Ok(n) = a.parse::<f64>() {
                    if n.is_finite() {
                        return Ok(Expr::Num(n));
                    }
                }
                Path::parse(a)
                    .map(Expr::Field)
                    .ok_or_else(|| PolicyLangError::Compile(format!("invalid symbol '{}'", a)))
            }
        },
        SExpr::List(items) => {
            let head = items
                .first()
                .ok_or_else(|| PolicyLangError::Compile("empty expression".into()))?;
            let op = head
                .as_atom()
                .ok_or_else(|| PolicyLangError::Compile(format!("operator expected, found {}", head)))?;
            let args = &items[1..];
            let sub = |s: &SExpr| compile_expr(s, depth + 1);

            if let Some(cmp) = CmpOp::parse(op) {
                arity(op, args, 2)?;
                return Ok(Expr::Cmp(cmp, Box::new(sub(&args[0])?), Box::new(sub(&args[1])?)));
            }
            match op {
                "and" | "or" => {
                    if args.is_empty() {
                        return Err(PolicyLangError::Compile(format!(
                            "'{}' needs at least one operand",
                            op
                        )));
                    }
                    let operands = args.iter().map(sub).collect::<Result<Vec<_>, _>>()?;
                    Ok(if op == "and" {
                        Expr::And(operands)
                    } else {
                        Expr::Or(operands)
                    })
                }
                "not" => {
                    arity(op, args, 1)?;
                    Ok(Expr::Not(Box::new(sub(&args[0])?)))
                }
                "loop" => {
                    arity(op, args, 1)?;
                    Ok(Expr::Loop(Box::new(sub(&args[0])?)))
                }
                "exists" => {
                    arity(op, args, 1)?;
                    Ok(Expr::Exists(path_arg(args.first(), op)?))
                }
                "in" => {
                    if args.len() < 2 {
                        return Err(PolicyLangError::Compile(
                            "'in' takes a field and at least one value".into(),
                        ));
                    }
                    let path = path_arg(args.first(), op)?;
                    let values = args[1..]
                        .iter()
                        .map(|a| match sub(a)? {
                            lit @ (Expr::Num(_) | Expr::Str(_) | Expr::Bool(_)) => Ok(lit),
                            other => Err(PolicyLangError::Compile(format!(
                                "'in' values must be literals, found {}",
                                other
                            ))),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Expr::In(path, values))
                }
                "contains" | "matches" => {
                    arity(op, args, 2)?;
                    let path = path_arg(args.first(), op)?;
                    let literal = string_arg(args.get(1), op)?;
                    Ok(if op == "contains" {
                        Expr::Contains(path, literal)
                    } else {
                        Expr::Matches(path, literal)
                    })
                }
                "any" | "all" => {
                    arity(op, args, 2)?;
                    let path = path_arg(args.first(), op)?;
                    let body = Box::new(sub(&args[1])?);
                    Ok(if op == "any" {
                        Expr::Any(path, body)
                    } else {
                        Expr::All(path, body)
                    })
                }
                "call" => {
                    let name = args
                        .first()
                        .and_then(SExpr::as_atom)
                        .ok_or_else(|| PolicyLangError::Compile("'call' needs a function name".into()))?;
                    let call_args = args[1..].iter().map(sub).collect::<Result<Vec<_>, _>>()?;
                    Ok(Expr::Call(name.to_string(), call_args))
                }
                other => Err(PolicyLangError::Compile(format!("unknown operator '{}'", other))),
            }
        }
    }
}
