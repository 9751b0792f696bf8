//! Bounded, side-effect-free evaluation of compiled rules.
//!
//! Every node visit costs one step. Evaluation stops with an error when the
//! step budget runs out, the deadline passes, or the cancel flag is raised.
//! A missing field or a type mismatch never errors: the comparison that
//! touches it is simply false.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::ast::{CmpOp, CompiledRule, Expr, Path};
use crate::error::PolicyLangError;

/// Built-in functions callable through `(call name ...)`.
pub const BUILTINS: &[&str] = &["abs", "len", "lower", "min", "max"];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

const CHECK_INTERVAL: u64 = 64;

/// Resource limits for one evaluation.
#[derive(Clone, Debug)]
pub struct EvalLimits {
    pub max_steps: u64,
    pub deadline: Option<Instant>,
}

impl EvalLimits {
    pub fn new(max_steps: u64) -> Self {
        Self {
            max_steps,
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// Tree-walking evaluator over JSON proposals.
pub struct Evaluator<'a> {
    limits: EvalLimits,
    cancel: Option<&'a AtomicBool>,
    steps: u64,
    scopes: Vec<&'a Value>,
}

impl<'a> Evaluator<'a> {
    pub fn new(limits: EvalLimits) -> Self {
        Self {
            limits,
            cancel: None,
            steps: 0,
            scopes: Vec::new(),
        }
    }

    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Evaluate a condition to a boolean. Only `true` is truthy.
    pub fn holds(&mut self, expr: &Expr, input: &'a Value) -> Result<bool, PolicyLangError> {
        Ok(matches!(self.eval(expr, input)?, Some(Value::Bool(true))))
    }

    fn tick(&mut self) -> Result<(), PolicyLangError> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(PolicyLangError::BudgetExceeded(self.limits.max_steps));
        }
        if self.steps % CHECK_INTERVAL == 0 {
            if let Some(deadline) = self.limits.deadline {
                if Instant::now() >= deadline {
                    return Err(PolicyLangError::DeadlineExceeded);
                }
            }
            if let Some(flag) = self.cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(PolicyLangError::Cancelled);
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, path: &Path, input: &'a Value) -> Option<&'a Value> {
        if path.is_element() {
            let scope: &'a Value = self.scopes.last().copied()?;
            lookup(scope, &path.0[1..])
        } else {
            lookup(input, &path.0)
        }
    }

    fn eval(&mut self, expr: &Expr, input: &'a Value) -> Result<Option<Value>, PolicyLangError> {
        self.tick()?;
        let value = match expr {
            Expr::Bool(b) => Some(Value::Bool(*b)),
            Expr::Num(n) => serde_json::Number::from_f64(*n).map(Value::Number),
            Expr::Str(s) => Some(Value::String(s.clone())),
            Expr::Field(path) => self.resolve(path, input).cloned(),
            Expr::Cmp(op, a, b) => {
                let left = self.eval(a, input)?;
                let right = self.eval(b, input)?;
                Some(Value::Bool(match (left, right) {
                    (Some(l), Some(r)) => compare(*op, &l, &r),
                    _ => false,
                }))
            }
            Expr::And(items) => {
                let mut result = true;
                for item in items {
                    if !self.holds(item, input)? {
                        result = false;
                        break;
                    }
                }
                Some(Value::Bool(result))
            }
            Expr::Or(items) => {
                let mut result = false;
                for item in items {
                    if self.holds(item, input)? {
                        result = true;
                        break;
                    }
                }
                Some(Value::Bool(result))
            }
            Expr::Not(inner) => Some(Value::Bool(!self.holds(inner, input)?)),
            Expr::Exists(path) => Some(Value::Bool(
                self.resolve(path, input).map(|v| !v.is_null()).unwrap_or(false),
            )),
            Expr::In(path, literals) => {
                let found = match self.resolve(path, input) {
                    Some(v) => {
                        let mut hit = false;
                        for lit in literals {
                            if let Some(l) = self.eval(lit, input)? {
                                if compare(CmpOp::Eq, v, &l) {
                                    hit = true;
                                    break;
                                }
                            }
                        }
                        hit
                    }
                    None => false,
                };
                Some(Value::Bool(found))
            }
            Expr::Contains(path, needle) => Some(Value::Bool(match self.resolve(path, input) {
                Some(Value::String(s)) => s.contains(needle.as_str()),
                Some(Value::Array(items)) => items.iter().any(|i| i.as_str() == Some(needle)),
                _ => false,
            })),
            Expr::Matches(path, pattern) => Some(Value::Bool(match self.resolve(path, input) {
                Some(Value::String(s)) => glob_match(pattern, s),
                _ => false,
            })),
            Expr::Any(path, body) | Expr::All(path, body) => {
                let is_any = matches!(expr, Expr::Any(..));
                let items = match self.resolve(path, input) {
                    Some(Value::Array(items)) => items,
                    _ => return Ok(Some(Value::Bool(false))),
                };
                let mut result = !is_any;
                for item in items {
                    self.scopes.push(item);
                    let held = self.holds(body, input);
                    self.scopes.pop();
                    if held? == is_any {
                        result = is_any;
                        break;
                    }
                }
                Some(Value::Bool(result))
            }
            Expr::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, input)?);
                }
                call_builtin(name, &values)?
            }
            Expr::Loop(cond) => {
                while self.holds(cond, input)? {
                    self.tick()?;
                }
                Some(Value::Bool(false))
            }
        };
        Ok(value)
    }
}

impl CompiledRule {
    /// Whether the rule's condition holds for `input`.
    pub fn fires(&self, input: &Value, limits: &EvalLimits) -> Result<bool, PolicyLangError> {
        Evaluator::new(limits.clone()).holds(&self.condition, input)
    }
}

/// Evaluate a standalone condition.
pub fn evaluate_condition(
    expr: &Expr,
    input: &Value,
    limits: &EvalLimits,
) -> Result<bool, PolicyLangError> {
    Evaluator::new(limits.clone()).holds(expr, input)
}

fn lookup<'v>(root: &'v Value, segments: &[String]) -> Option<&'v Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return match op {
            CmpOp::Lt => l < r,
            CmpOp::Le => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Ge => l >= r,
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
        };
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => match op {
            CmpOp::Lt => l < r,
            CmpOp::Le => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Ge => l >= r,
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
        },
        (Value::Bool(l), Value::Bool(r)) => match op {
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
            _ => false,
        },
        _ => false,
    }
}

fn call_builtin(name: &str, args: &[Option<Value>]) -> Result<Option<Value>, PolicyLangError> {
    let bad = |detail: &str| PolicyLangError::BadArguments {
        name: name.to_string(),
        detail: detail.to_string(),
    };
    let number = |n: f64| serde_json::Number::from_f64(n).map(Value::Number);

    if !is_builtin(name) {
        return Err(PolicyLangError::UnknownBuiltin(name.to_string()));
    }
    // A missing argument makes the whole call missing.
    if args.iter().any(Option::is_none) {
        return Ok(None);
    }
    let args: Vec<&Value> = args.iter().flatten().collect();

    match name {
        "abs" => {
            let [v] = args.as_slice() else {
                return Err(bad("expects one argument"));
            };
            let n = v.as_f64().ok_or_else(|| bad("expects a number"))?;
            Ok(number(n.abs()))
        }
        "len" => {
            let [v] = args.as_slice() else {
                return Err(bad("expects one argument"));
            };
            let len = match v {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                _ => return Err(bad("expects a string, array or object")),
            };
            Ok(number(len as f64))
        }
        "lower" => {
            let [v] = args.as_slice() else {
                return Err(bad("expects one argument"));
            };
            let s = v.as_str().ok_or_else(|| bad("expects a string"))?;
            Ok(Some(Value::String(s.to_lowercase())))
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(bad("expects at least one argument"));
            }
            let nums = args
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| bad("expects numbers")))
                .collect::<Result<Vec<_>, _>>()?;
            let folded = if name == "min" {
                nums.into_iter().fold(f64::INFINITY, f64::min)
            } else {
                nums.into_iter().fold(f64::NEG_INFINITY, f64::max)
            };
            Ok(number(folded))
        }
        other => Err(PolicyLangError::UnknownBuiltin(other.to_string())),
    }
}

/// Glob match supporting `*` (any run) and `?` (one character).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_rule;
    use serde_json::json;

    fn fires(rule: &str, input: Value) -> Result<bool, PolicyLangError> {
        compile_rule(rule).unwrap().fires(&input, &EvalLimits::default())
    }

    #[test]
    fn numeric_threshold() {
        let rule = r#"(rule m (when (< metrics.safety_margin 0.2)) (then deny "low"))"#;
        assert!(fires(rule, json!({"metrics": {"safety_margin": 0.1}})).unwrap());
        assert!(!fires(rule, json!({"metrics": {"safety_margin": 0.3}})).unwrap());
    }

    #[test]
    fn missing_field_is_false_not_error() {
        let rule = r#"(rule m (when (< metrics.safety_margin 0.2)) (then deny "low"))"#;
        assert!(!fires(rule, json!({})).unwrap());
        assert!(!fires(rule, json!({"metrics": {"safety_margin": "high"}})).unwrap());
        let ne = r#"(rule m (when (!= region "eu")) (then warn "x"))"#;
        assert!(!fires(ne, json!({})).unwrap());
    }

    #[test]
    fn boolean_connectives() {
        let rule = r#"(rule r (when (and (== kind "transfer") (or (> amount 100) (not (exists approved_by))))) (then deny "x"))"#;
        assert!(fires(rule, json!({"kind": "transfer", "amount": 500, "approved_by": "a"})).unwrap());
        assert!(fires(rule, json!({"kind": "transfer", "amount": 5})).unwrap());
        assert!(!fires(rule, json!({"kind": "transfer", "amount": 5, "approved_by": "a"})).unwrap());
        assert!(!fires(rule, json!({"kind": "read", "amount": 500})).unwrap());
    }

    #[test]
    fn membership_and_strings() {
        let rule = r#"(rule r (when (in region "eu" "uk")) (then warn "x"))"#;
        assert!(fires(rule, json!({"region": "uk"})).unwrap());
        assert!(!fires(rule, json!({"region": "us"})).unwrap());

        let rule = r#"(rule r (when (contains tags "pii")) (then deny "x"))"#;
        assert!(fires(rule, json!({"tags": ["public", "pii"]})).unwrap());
        assert!(fires(rule, json!({"tags": "has-pii-data"})).unwrap());

        let rule = r#"(rule r (when (matches target "prod-*")) (then deny "x"))"#;
        assert!(fires(rule, json!({"target": "prod-db"})).unwrap());
        assert!(!fires(rule, json!({"target": "staging"})).unwrap());
    }

    #[test]
    fn quantifiers() {
        let any = r#"(rule r (when (any items (> it.price 100))) (then warn "x"))"#;
        let all = r#"(rule r (when (all items (> it.price 100))) (then warn "x"))"#;
        let input = json!({"items": [{"price": 50}, {"price": 150}]});
        assert!(fires(any, input.clone()).unwrap());
        assert!(!fires(all, input).unwrap());
        assert!(fires(all, json!({"items": []})).unwrap());
        assert!(!fires(all, json!({})).unwrap());
        assert!(!fires(any, json!({"items": []})).unwrap());
    }

    #[test]
    fn array_index_paths() {
        let rule = r#"(rule r (when (== steps.0.kind "delete")) (then deny "x"))"#;
        assert!(fires(rule, json!({"steps": [{"kind": "delete"}]})).unwrap());
    }

    #[test]
    fn builtins() {
        let rule = r#"(rule r (when (> (call abs delta) 5)) (then warn "x"))"#;
        assert!(fires(rule, json!({"delta": -10})).unwrap());
        assert!(!fires(rule, json!({})).unwrap());

        let rule = r#"(rule r (when (== (call lower region) "eu")) (then warn "x"))"#;
        assert!(fires(rule, json!({"region": "EU"})).unwrap());

        let rule = r#"(rule r (when (>= (call max a b) 3)) (then warn "x"))"#;
        assert!(fires(rule, json!({"a": 1, "b": 3})).unwrap());

        let rule = r#"(rule r (when (> (call len items) 2)) (then warn "x"))"#;
        assert!(fires(rule, json!({"items": [1, 2, 3]})).unwrap());
    }

    #[test]
    fn unknown_builtin_is_evaluation_error() {
        let rule = r#"(rule r (when (call shell cmd)) (then deny "x"))"#;
        assert_eq!(
            fires(rule, json!({"cmd": "ls"})),
            Err(PolicyLangError::UnknownBuiltin("shell".into()))
        );
        let rule = r#"(rule r (when (> (call abs name) 1)) (then deny "x"))"#;
        assert!(matches!(
            fires(rule, json!({"name": "x"})),
            Err(PolicyLangError::BadArguments { .. })
        ));
    }

    #[test]
    fn loop_exhausts_budget() {
        let rule = compile_rule(r#"(rule r (when (loop true)) (then deny "x"))"#).unwrap();
        let result = rule.fires(&json!({}), &EvalLimits::new(500));
        assert_eq!(result, Err(PolicyLangError::BudgetExceeded(500)));

        let terminating = compile_rule(r#"(rule r (when (loop false)) (then deny "x"))"#).unwrap();
        assert_eq!(terminating.fires(&json!({}), &EvalLimits::new(500)), Ok(false));
    }

    #[test]
    fn deadline_is_enforced() {
        let rule = compile_rule(r#"(rule r (when (loop true)) (then deny "x"))"#).unwrap();
        let limits = EvalLimits::new(u64::MAX).with_deadline(Instant::now());
        assert_eq!(
            rule.fires(&json!({}), &limits),
            Err(PolicyLangError::DeadlineExceeded)
        );
    }

    #[test]
    fn cancellation() {
        let rule = compile_rule(r#"(rule r (when (loop true)) (then deny "x"))"#).unwrap();
        let flag = AtomicBool::new(true);
        let input = json!({});
        let mut eval = Evaluator::new(EvalLimits::new(u64::MAX)).with_cancel(&flag);
        assert_eq!(
            eval.holds(&rule.condition, &input),
            Err(PolicyLangError::Cancelled)
        );
    }

    #[test]
    fn glob_patterns() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a?c", "abc"));
        assert!(glob_match("a*c*", "abxxcyy"));
        assert!(!glob_match("a*d", "abc"));
        assert!(glob_match("", ""));
        assert!(!glob_match("", "x"));
    }
}
