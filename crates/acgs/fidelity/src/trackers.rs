//! Bounded sample windows feeding the fidelity components.
//!
//! An empty tracker reports 1.0: no evidence of infidelity yet.

use std::collections::VecDeque;

use acgs_types::{EnforcementDecision, Verdict};

use crate::error::FidelityError;

#[derive(Clone, Debug)]
struct Window {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 1.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Share of synthesis attempts that ended in a promotion.
#[derive(Clone, Debug)]
pub struct SynthesisTracker(Window);

impl SynthesisTracker {
    pub fn new(window: usize) -> Self {
        Self(Window::new(window))
    }

    pub fn record(&mut self, promoted: bool) {
        self.0.push(if promoted { 1.0 } else { 0.0 });
    }

    pub fn rate(&self) -> f64 {
        self.0.mean()
    }

    pub fn samples(&self) -> usize {
        self.0.len()
    }
}

/// Agreement between engine verdicts and held-out ground truth.
#[derive(Clone, Debug)]
pub struct EnforcementAccuracyTracker(Window);

impl EnforcementAccuracyTracker {
    pub fn new(window: usize) -> Self {
        Self(Window::new(window))
    }

    pub fn record(&mut self, decided: Verdict, truth: Verdict) {
        self.0.push(if decided == truth { 1.0 } else { 0.0 });
    }

    pub fn record_decision(&mut self, decision: &EnforcementDecision, truth: Verdict) {
        self.record(decision.verdict, truth);
    }

    pub fn accuracy(&self) -> f64 {
        self.0.mean()
    }

    pub fn samples(&self) -> usize {
        self.0.len()
    }
}

/// Inverse generations-to-compliance: a proposal stream that complies in
/// its first generation scores 1, after four generations 0.25.
#[derive(Clone, Debug)]
pub struct AdaptationTracker(Window);

impl AdaptationTracker {
    pub fn new(window: usize) -> Self {
        Self(Window::new(window))
    }

    pub fn record(&mut self, generations_to_compliance: u32) {
        self.0.push(1.0 / f64::from(generations_to_compliance.max(1)));
    }

    pub fn velocity(&self) -> f64 {
        self.0.mean()
    }

    pub fn samples(&self) -> usize {
        self.0.len()
    }
}

/// Stakeholder satisfaction survey results in `[0, 1]`.
#[derive(Clone, Debug)]
pub struct SatisfactionTracker(Window);

impl SatisfactionTracker {
    pub fn new(window: usize) -> Self {
        Self(Window::new(window))
    }

    pub fn record(&mut self, satisfaction: f64) -> Result<(), FidelityError> {
        if !(0.0..=1.0).contains(&satisfaction) {
            return Err(FidelityError::InvalidSample(format!(
                "satisfaction {} outside [0, 1]",
                satisfaction
            )));
        }
        self.0.push(satisfaction);
        Ok(())
    }

    pub fn satisfaction(&self) -> f64 {
        self.0.mean()
    }

    pub fn samples(&self) -> usize {
        self.0.len()
    }
}
