use crate::{
    Event, Timestamp,
    binding::{BindingId, ScopeKey},
    monitor::MonitorStats,
};
use std::{
    fmt::Display,
    sync::{Arc, Mutex, mpsc::Sender},
};

/// Final disposition of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The formula holds.
    True,
    /// The formula is violated.
    False,
    /// The scope closed while the formula was still undecided.
    Inconclusive,
}

impl Outcome {
    /// The truth value, if decided.
    pub fn truth(&self) -> Option<bool> {
        match self {
            Outcome::True => Some(true),
            Outcome::False => Some(false),
            Outcome::Inconclusive => None,
        }
    }
}

impl From<Option<bool>> for Outcome {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Outcome::True,
            Some(false) => Outcome::False,
            None => Outcome::Inconclusive,
        }
    }
}

impl From<bool> for Outcome {
    fn from(value: bool) -> Self {
        Outcome::from(Some(value))
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::True => write!(f, "true"),
            Outcome::False => write!(f, "false"),
            Outcome::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// What led a binding to its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The event with the given timestamp decided the formula.
    Event(Timestamp),
    /// The binding's scope closed.
    ScopeClosure,
}

/// The verdict recorded for one binding of one specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Name of the specification.
    pub specification: Arc<str>,
    /// The binding the verdict is about.
    pub binding: BindingId,
    /// Scope instance of the binding.
    pub scope: ScopeKey,
    /// The outcome.
    pub outcome: Outcome,
    /// What decided the outcome.
    pub decided_by: Decision,
    /// Events bound by the binding, ordered by timestamp.
    pub evidence: Vec<Arc<Event>>,
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] binding {}: {}",
            self.specification, self.scope, self.binding, self.outcome
        )?;
        let stamps = self
            .evidence
            .iter()
            .map(|event| event.timestamp.to_string())
            .collect::<Vec<_>>();
        write!(f, " (evidence at {})", stamps.join(", "))
    }
}

/// The current state of an open binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSnapshot {
    /// Name of the specification.
    pub specification: Arc<str>,
    /// The binding.
    pub binding: BindingId,
    /// Scope instance of the binding.
    pub scope: ScopeKey,
    /// Timestamp of the event that created the binding.
    pub created: Timestamp,
    /// Current truth value of the formula (always unknown for open bindings,
    /// unless the scope closed in the meantime).
    pub truth: Option<bool>,
    /// Variables bound so far.
    pub bound: Vec<String>,
}

/// The reporting collaborator receiving verdicts from a monitor.
pub trait VerdictSink: Send {
    /// Receives a verdict, in the order bindings reach a decision.
    fn verdict(&mut self, verdict: Verdict);

    /// Receives the final statistics once the monitor has stopped.
    fn finalize(&mut self, _stats: &MonitorStats) {}
}

// Dummy sink discarding verdicts.
impl VerdictSink for () {
    #[inline(always)]
    fn verdict(&mut self, _verdict: Verdict) {}
}

impl VerdictSink for Sender<Verdict> {
    fn verdict(&mut self, verdict: Verdict) {
        // The receiving end may have been dropped.
        let _ = self.send(verdict);
    }
}

/// Sink collecting verdicts in a shared list.
#[derive(Debug, Clone, Default)]
pub struct VerdictLog {
    verdicts: Arc<Mutex<Vec<Verdict>>>,
    stats: Arc<Mutex<Option<MonitorStats>>>,
}

impl VerdictLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// The verdicts collected so far.
    pub fn verdicts(&self) -> Vec<Verdict> {
        self.verdicts.lock().expect("lock").clone()
    }

    /// Removes and returns the verdicts collected so far.
    pub fn take(&self) -> Vec<Verdict> {
        std::mem::take(&mut *self.verdicts.lock().expect("lock"))
    }

    /// The final statistics, once the monitor has stopped.
    pub fn stats(&self) -> Option<MonitorStats> {
        *self.stats.lock().expect("lock")
    }
}

impl VerdictSink for VerdictLog {
    fn verdict(&mut self, verdict: Verdict) {
        self.verdicts.lock().expect("lock").push(verdict);
    }

    fn finalize(&mut self, stats: &MonitorStats) {
        *self.stats.lock().expect("lock") = Some(*stats);
    }
}
