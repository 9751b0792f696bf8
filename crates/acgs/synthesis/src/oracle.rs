use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use acgs_types::{Principle, Verdict};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::SynthesisContext;
use crate::error::SynthesisError;

/// One synthesis request sent to an oracle.
#[derive(Clone, Debug)]
pub struct OracleRequest {
    pub principle: Principle,
    pub context: SynthesisContext,
    pub prompt: String,
    pub attempt: u32,
}

/// Raw oracle reply, before parsing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OracleResponse {
    pub rule_text: String,
    pub confidence: f64,
}

impl OracleResponse {
    pub fn new(rule_text: impl Into<String>, confidence: f64) -> Self {
        Self {
            rule_text: rule_text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A source of candidate rules (language model or deterministic stand-in).
#[async_trait]
pub trait RuleOracle: Send + Sync {
    /// Identity recorded on every candidate this oracle produces.
    fn id(&self) -> &str;

    async fn propose(&self, request: &OracleRequest) -> Result<OracleResponse, SynthesisError>;
}

/// Deterministic oracle that renders rules from a principle's formal spec,
/// or failing that, from its violating scenarios.
pub struct TemplateOracle {
    id: String,
    spec_confidence: f64,
    scenario_confidence: f64,
}

impl TemplateOracle {
    pub fn new() -> Self {
        Self {
            id: "template-oracle-v1".into(),
            spec_confidence: 0.9,
            scenario_confidence: 0.6,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    fn render(
        &self,
        principle: &Principle,
        context: &SynthesisContext,
        condition: &str,
        verdict: Verdict,
    ) -> String {
        let name = slug(principle.id.as_str());
        let explanation = escape(&principle.description);
        match &context.corrective_template {
            Some(template) => template
                .replace("{name}", &name)
                .replace("{condition}", condition)
                .replace("{verdict}", &verdict.to_string())
                .replace("{explanation}", &explanation),
            None => format!(
                "(rule {} (when {}) (then {} \"{}\"))",
                name, condition, verdict, explanation
            ),
        }
    }
}

impl Default for TemplateOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleOracle for TemplateOracle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn propose(&self, request: &OracleRequest) -> Result<OracleResponse, SynthesisError> {
        let principle = &request.principle;
        let context = &request.context;
        let verdict = violation_verdict(principle);
        let forbidden = |text: &str| context.forbidden_patterns.iter().any(|p| text.contains(p.as_str()));

        if let Some(spec) = &principle.formal_spec {
            let text = self.render(principle, context, spec, verdict);
            let reads_excluded = context
                .excluded_fields
                .iter()
                .any(|f| spec.contains(f.as_str()));
            if !forbidden(&text) && !reads_excluded {
                return Ok(OracleResponse::new(text, self.spec_confidence));
            }
        }

        let condition = scenario_condition(principle, &context.excluded_fields).ok_or_else(|| {
            SynthesisError::Oracle {
                oracle: self.id.clone(),
                detail: format!("principle {} has no usable scenarios", principle.id),
            }
        })?;
        let text = self.render(principle, context, &condition, verdict);
        if forbidden(&text) {
            return Err(SynthesisError::Oracle {
                oracle: self.id.clone(),
                detail: "every rendering contains a forbidden construct".into(),
            });
        }
        Ok(OracleResponse::new(text, self.scenario_confidence))
    }
}

/// The strictest verdict among the principle's scenarios, `deny` if none.
fn violation_verdict(principle: &Principle) -> Verdict {
    principle
        .scenarios
        .iter()
        .map(|s| s.then)
        .filter(Verdict::is_violation)
        .max()
        .unwrap_or(Verdict::Deny)
}

/// Condition matching exactly the inputs of the violating scenarios.
fn scenario_condition(principle: &Principle, excluded: &[String]) -> Option<String> {
    let mut clauses = Vec::new();
    for scenario in principle.scenarios.iter().filter(|s| s.then.is_violation()) {
        let mut leaves = Vec::new();
        flatten(&scenario.input(), String::new(), &mut leaves);
        let tests: Vec<String> = leaves
            .into_iter()
            .filter(|(path, _)| !path.split('.').any(|seg| excluded.iter().any(|e| e == seg)))
            .map(|(path, literal)| format!("(== {} {})", path, literal))
            .collect();
        match tests.len() {
            0 => {}
            1 => clauses.push(tests.into_iter().next()?),
            _ => clauses.push(format!("(and {})", tests.join(" "))),
        }
    }
    match clauses.len() {
        0 => None,
        1 => clauses.into_iter().next(),
        _ => Some(format!("(or {})", clauses.join(" "))),
    }
}

fn flatten(value: &Value, prefix: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(v, path, out);
            }
        }
        Value::Number(n) if !prefix.is_empty() => out.push((prefix, n.to_string())),
        Value::Bool(b) if !prefix.is_empty() => out.push((prefix, b.to_string())),
        Value::String(s) if !prefix.is_empty() => out.push((prefix, format!("\"{}\"", escape(s)))),
        _ => {}
    }
}

fn slug(id: &str) -> String {
    let s: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
        .collect();
    if s.is_empty() {
        "rule".into()
    } else {
        s
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A scripted fixture reply.
#[derive(Clone, Debug)]
pub enum FixtureReply {
    Rule { text: String, confidence: f64 },
    Failure(String),
}

/// Oracle replaying scripted replies in order; the last reply repeats.
pub struct FixtureOracle {
    id: String,
    replies: Mutex<VecDeque<FixtureReply>>,
    last: Mutex<Option<FixtureReply>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FixtureOracle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            replies: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_reply(self, text: impl Into<String>, confidence: f64) -> Self {
        self.replies
            .lock()
            .expect("lock not poisoned")
            .push_back(FixtureReply::Rule {
                text: text.into(),
                confidence,
            });
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.replies
            .lock()
            .expect("lock not poisoned")
            .push_back(FixtureReply::Failure(message.into()));
        self
    }

    /// Delay every reply, e.g. to exercise oracle timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Option<FixtureReply> {
        let mut replies = self.replies.lock().expect("lock not poisoned");
        let mut last = self.last.lock().expect("lock not poisoned");
        if let Some(reply) = replies.pop_front() {
            *last = Some(reply.clone());
            Some(reply)
        } else {
            last.clone()
        }
    }
}

#[async_trait]
impl RuleOracle for FixtureOracle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn propose(&self, _request: &OracleRequest) -> Result<OracleResponse, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.next_reply() {
            Some(FixtureReply::Rule { text, confidence }) => Ok(OracleResponse::new(text, confidence)),
            Some(FixtureReply::Failure(detail)) => Err(SynthesisError::Oracle {
                oracle: self.id.clone(),
                detail,
            }),
            None => Err(SynthesisError::Oracle {
                oracle: self.id.clone(),
                detail: "no scripted reply".into(),
            }),
        }
    }
}

/// Oracle that always fails.
pub struct FailingOracle;

#[async_trait]
impl RuleOracle for FailingOracle {
    fn id(&self) -> &str {
        "failing-oracle"
    }

    async fn propose(&self, _request: &OracleRequest) -> Result<OracleResponse, SynthesisError> {
        Err(SynthesisError::Oracle {
            oracle: "failing-oracle".into(),
            detail: "simulated oracle failure".into(),
        })
    }
}
