//! Finite-domain model search over rule conditions.
//!
//! Each field a condition reads gets a small candidate set derived from the
//! constants it is compared against: the constant itself, its neighbours,
//! its negation, midpoints between constants, and "absent". The search then
//! enumerates assignments deterministically until the predicate holds or a
//! limit is reached. A witness is a concrete proposal payload.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::ast::{Expr, Path};

/// Placeholder string that differs from every constant in a rule.
pub const OTHER_STRING: &str = "__other__";

const MAX_ELEMENT_SAMPLES: u128 = 8;
const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// Search limits.
#[derive(Clone, Debug)]
pub struct SearchLimits {
    pub max_assignments: u64,
    pub deadline: Option<Instant>,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_assignments: 20_000,
            deadline: None,
        }
    }
}

/// Result of a model search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SearchOutcome {
    /// A payload satisfying the predicate.
    Witness(Value),
    /// The whole finite domain was explored without a witness.
    Exhausted { explored: u64 },
    /// The assignment cap or deadline stopped the search early.
    LimitReached { explored: u64 },
}

impl SearchOutcome {
    pub fn witness(&self) -> Option<&Value> {
        match self {
            Self::Witness(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Collector {
    numbers: BTreeMap<Vec<String>, Vec<f64>>,
    values: BTreeMap<Vec<String>, Vec<Value>>,
    presence: BTreeMap<Vec<String>, ()>,
    arrays: BTreeMap<Vec<String>, Collector>,
    constants: Vec<f64>,
}

impl Collector {
    fn touch(&mut self, key: &[String]) {
        self.presence.insert(key.to_vec(), ());
    }

    fn number(&mut self, key: &[String], n: f64) {
        self.touch(key);
        self.numbers.entry(key.to_vec()).or_default().push(n);
    }

    fn value(&mut self, key: &[String], v: Value) {
        self.touch(key);
        self.values.entry(key.to_vec()).or_default().push(v);
    }

    fn finish(self) -> Domain {
        let mut constants = self.constants.clone();
        constants.extend(self.constants.iter().map(|c| -c));
        constants.push(0.0);

        let mut fields: BTreeMap<Vec<String>, Vec<Option<Value>>> = BTreeMap::new();
        for key in self.presence.keys() {
            let mut candidates: Vec<Option<Value>> = vec![None];

            let nums = self.numbers.get(key);
            let vals = self.values.get(key);
            if let Some(nums) = nums {
                candidates.extend(expand_numbers(nums).into_iter().map(Some));
            }
            if let Some(vals) = vals {
                // Sorted so the domain does not depend on expression order.
                let mut vals: Vec<&Value> = vals.iter().collect();
                vals.sort_by_key(|v| v.to_string());
                let mut has_string = false;
                for v in vals {
                    has_string |= v.is_string();
                    if !candidates.iter().any(|c| c.as_ref() == Some(v)) {
                        candidates.push(Some(v.clone()));
                    }
                }
                if has_string {
                    candidates.push(Some(Value::String(OTHER_STRING.into())));
                }
            }
            if nums.is_none() && vals.is_none() && !self.arrays.contains_key(key) {
                candidates.push(Some(Value::Bool(true)));
                candidates.push(Some(Value::Bool(false)));
                candidates.extend(expand_numbers(&constants).into_iter().map(Some));
            }
            fields.insert(key.clone(), candidates);
        }

        for (key, element) in self.arrays {
            let element = element.finish();
            let entry = fields.entry(key).or_insert_with(|| vec![None]);
            entry.push(Some(Value::Array(Vec::new())));
            let size = element.size();
            let samples = size.min(MAX_ELEMENT_SAMPLES);
            for i in 0..samples {
                let index = if size <= MAX_ELEMENT_SAMPLES {
                    i
                } else {
                    i * size / MAX_ELEMENT_SAMPLES
                };
                entry.push(Some(Value::Array(vec![element.assignment(index)])));
            }
        }

        Domain { fields }
    }
}

fn to_json_number(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        Some(Value::Number(Number::from(n as i64)))
    } else {
        Number::from_f64(n).map(Value::Number)
    }
}

fn expand_numbers(constants: &[f64]) -> Vec<Value> {
    let mut base: Vec<f64> = constants.iter().copied().filter(|c| c.is_finite()).collect();
    base.sort_by(f64::total_cmp);
    base.dedup();

    let mut out = Vec::new();
    for c in &base {
        out.extend([*c - 1.0, *c, *c + 1.0, -*c]);
    }
    for pair in base.windows(2) {
        out.push((pair[0] + pair[1]) / 2.0);
    }
    out.sort_by(f64::total_cmp);
    out.dedup();
    out.into_iter().filter_map(to_json_number).collect()
}

fn collect(expr: &Expr, root: &mut Collector, mut elem: Option<&mut Collector>) {
    fn target<'c>(
        path: &Path,
        root: &'c mut Collector,
        elem: Option<&'c mut Collector>,
    ) -> Option<(&'c mut Collector, Vec<String>)> {
        if path.is_element() {
            elem.map(|e| (e, path.element_relative().0))
        } else {
            Some((root, path.0.clone()))
        }
    }

    match expr {
        Expr::Num(n) => root.constants.push(*n),
        Expr::Field(p) => {
            if let Some((c, key)) = target(p, root, elem) {
                c.touch(&key);
            }
        }
        Expr::Cmp(_, a, b) => {
            for (field, other) in [(a.as_ref(), b.as_ref()), (b.as_ref(), a.as_ref())] {
                match (field, other) {
                    (Expr::Field(p), Expr::Num(n)) => {
                        if let Some((c, key)) = target(p, root, elem.as_deref_mut()) {
                            c.number(&key, *n);
                        }
                    }
                    (Expr::Field(p), Expr::Str(s)) => {
                        if let Some((c, key)) = target(p, root, elem.as_deref_mut()) {
                            c.value(&key, Value::String(s.clone()));
                        }
                    }
                    (Expr::Field(p), Expr::Bool(v)) => {
                        if let Some((c, key)) = target(p, root, elem.as_deref_mut()) {
                            c.value(&key, Value::Bool(*v));
                        }
                    }
                    (Expr::Field(p), Expr::Field(_)) => {
                        if let Some((c, key)) = target(p, root, elem.as_deref_mut()) {
                            c.number(&key, 0.0);
                            c.number(&key, 1.0);
                        }
                    }
                    (Expr::Call(_, args), Expr::Num(n)) => {
                        for arg in args {
                            if let Expr::Field(p) = arg {
                                if let Some((c, key)) = target(p, root, elem.as_deref_mut()) {
                                    c.number(&key, *n);
                                    c.number(&key, -*n);
                                }
                            }
                        }
                    }
                    (Expr::Call(_, args), Expr::Str(s)) => {
                        for arg in args {
                            if let Expr::Field(p) = arg {
                                if let Some((c, key)) = target(p, root, elem.as_deref_mut()) {
                                    c.value(&key, Value::String(s.clone()));
                                    c.value(&key, Value::String(s.to_uppercase()));
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            collect(a, root, elem.as_deref_mut());
            collect(b, root, elem);
        }
        Expr::And(items) | Expr::Or(items) => {
            for item in items {
                mark_boolean(item, root, elem.as_deref_mut());
                collect(item, root, elem.as_deref_mut());
            }
        }
        Expr::Not(inner) => {
            mark_boolean(inner, root, elem.as_deref_mut());
            collect(inner, root, elem);
        }
        Expr::Loop(inner) => collect(inner, root, elem),
        Expr::Call(_, args) => {
            for arg in args {
                collect(arg, root, elem.as_deref_mut());
            }
        }
        Expr::Exists(p) => {
            if let Some((c, key)) = target(p, root, elem) {
                c.touch(&key);
            }
        }
        Expr::In(p, literals) => {
            if let Some((c, key)) = target(p, root, elem) {
                for lit in literals {
                    match lit {
                        Expr::Num(n) => c.number(&key, *n),
                        Expr::Str(s) => c.value(&key, Value::String(s.clone())),
                        Expr::Bool(b) => c.value(&key, Value::Bool(*b)),
                        _ => {}
                    }
                }
            }
        }
        Expr::Contains(p, needle) => {
            if let Some((c, key)) = target(p, root, elem) {
                c.value(&key, Value::String(needle.clone()));
                c.value(&key, Value::Array(vec![Value::String(needle.clone())]));
            }
        }
        Expr::Matches(p, pattern) => {
            if let Some((c, key)) = target(p, root, elem) {
                c.value(&key, Value::String(pattern.replace('*', "").replace('?', "a")));
                c.value(&key, Value::String(pattern.replace('*', "x").replace('?', "b")));
            }
        }
        Expr::Any(p, body) | Expr::All(p, body) => {
            let mut element = Collector::default();
            collect(body, root, Some(&mut element));
            if let Some((c, key)) = target(p, root, elem) {
                let slot = c.arrays.entry(key.clone()).or_default();
                merge(slot, element);
                c.touch(&key);
            }
        }
        Expr::Bool(_) | Expr::Str(_) => {}
    }
}

fn mark_boolean(expr: &Expr, root: &mut Collector, elem: Option<&mut Collector>) {
    if let Expr::Field(p) = expr {
        let key = if p.is_element() {
            match elem {
                Some(e) => {
                    let key = p.element_relative().0;
                    e.value(&key, Value::Bool(true));
                    e.value(&key, Value::Bool(false));
                    return;
                }
                None => return,
            }
        } else {
            p.0.clone()
        };
        root.value(&key, Value::Bool(true));
        root.value(&key, Value::Bool(false));
    }
}

fn merge(into: &mut Collector, from: Collector) {
    for (k, v) in from.numbers {
        into.numbers.entry(k).or_default().extend(v);
    }
    for (k, v) in from.values {
        into.values.entry(k).or_default().extend(v);
    }
    into.presence.extend(from.presence);
    for (k, v) in from.arrays {
        merge(into.arrays.entry(k).or_default(), v);
    }
    into.constants.extend(from.constants);
}

/// Candidate values per field path.
#[derive(Clone, Debug, Default)]
pub struct Domain {
    fields: BTreeMap<Vec<String>, Vec<Option<Value>>>,
}

impl Domain {
    /// Build the joint domain of every field read by `exprs`.
    pub fn for_exprs<'e>(exprs: impl IntoIterator<Item = &'e Expr>) -> Self {
        let mut root = Collector::default();
        for expr in exprs {
            mark_boolean(expr, &mut root, None);
            collect(expr, &mut root, None);
        }
        root.finish()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Candidate values for one field; `None` stands for an absent field.
    pub fn candidates(&self, key: &[String]) -> Option<&[Option<Value>]> {
        self.fields.get(key).map(Vec::as_slice)
    }

    /// Number of distinct assignments (saturating).
    pub fn size(&self) -> u128 {
        self.fields
            .values()
            .fold(1u128, |acc, c| acc.saturating_mul(c.len().max(1) as u128))
    }

    /// The assignment at `index` in mixed-radix order, as a payload.
    pub fn assignment(&self, index: u128) -> Value {
        let mut root = Value::Object(Map::new());
        let mut rest = index;
        for (key, candidates) in &self.fields {
            let radix = candidates.len().max(1) as u128;
            let pick = (rest % radix) as usize;
            rest /= radix;
            if let Some(Some(value)) = candidates.get(pick) {
                set_path(&mut root, key, value.clone());
            }
        }
        root
    }
}

/// Write `value` at a dotted key, creating intermediate objects.
pub fn set_path(root: &mut Value, key: &[String], value: Value) {
    let Some((last, parents)) = key.split_last() else {
        return;
    };
    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.clone(), value);
    }
}

/// Deterministic bounded search for a payload satisfying a predicate.
#[derive(Clone, Debug)]
pub struct ModelSearch {
    domain: Domain,
    limits: SearchLimits,
}

impl ModelSearch {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            limits: SearchLimits::default(),
        }
    }

    pub fn over<'e>(exprs: impl IntoIterator<Item = &'e Expr>) -> Self {
        Self::new(Domain::for_exprs(exprs))
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn find(&self, mut predicate: impl FnMut(&Value) -> bool) -> SearchOutcome {
        let size = self.domain.size();
        let cap = size.min(self.limits.max_assignments as u128);
        let mut explored: u64 = 0;

        for index in 0..cap {
            if explored % DEADLINE_CHECK_INTERVAL == 0 && explored > 0 {
                if let Some(deadline) = self.limits.deadline {
                    if Instant::now() >= deadline {
                        return SearchOutcome::LimitReached { explored };
                    }
                }
            }
            let candidate = self.domain.assignment(index);
            explored += 1;
            if predicate(&candidate) {
                return SearchOutcome::Witness(candidate);
            }
        }

        if cap < size {
            SearchOutcome::LimitReached { explored }
        } else {
            SearchOutcome::Exhausted { explored }
        }
    }
}
