//! Bindings: the values bound to a specification's variables within one scope instance.

use crate::{
    ContextId, Event, Timestamp, Val,
    evaluator::{ClosurePolicy, FormulaState},
    specification::Specification,
    verdict::{BindingSnapshot, Decision, Outcome, Verdict},
};
use log::{trace, warn};
use smallvec::SmallVec;
use std::{fmt::Display, sync::Arc};

/// Identifier of a binding, unique within its [`crate::BindingManager`].
pub type BindingId = u64;

/// The scope instance a binding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKey {
    /// The whole monitoring session.
    Global,
    /// An execution context.
    Context(ContextId),
    /// The given (numbered) occurrence of the opening program point in an execution context.
    Occurrence(ContextId, u64),
}

impl ScopeKey {
    /// The execution context of the scope, if any.
    pub fn context(&self) -> Option<ContextId> {
        match self {
            ScopeKey::Global => None,
            ScopeKey::Context(ctx) | ScopeKey::Occurrence(ctx, _) => Some(*ctx),
        }
    }
}

impl Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeKey::Global => write!(f, "global"),
            ScopeKey::Context(ctx) => write!(f, "ctx={ctx}"),
            ScopeKey::Occurrence(ctx, seq) => write!(f, "ctx={ctx}#{seq}"),
        }
    }
}

/// Lifecycle status of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Still collecting evidence.
    Open,
    /// A verdict has been recorded; the binding only keeps its scope occupied.
    VerdictReached,
    /// The binding's scope has closed.
    ScopeClosed,
}

/// The values a quantifier accepted from one event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Observation {
    pub(crate) timestamp: Timestamp,
    // One entry per declared field.
    pub(crate) values: SmallVec<[Option<Val>; 4]>,
}

/// The latest two observations bound to a variable.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Slot {
    pub(crate) current: Observation,
    pub(crate) previous: Option<Observation>,
}

#[derive(Debug)]
pub(crate) struct Binding {
    pub(crate) id: BindingId,
    pub(crate) key: ScopeKey,
    pub(crate) created: Timestamp,
    pub(crate) status: Status,
    slots: Vec<Option<Slot>>,
    state: Option<FormulaState>,
    evidence: Vec<Arc<Event>>,
}

impl Binding {
    pub(crate) fn new(
        id: BindingId,
        key: ScopeKey,
        spec: &Specification,
        created: Timestamp,
    ) -> Self {
        Self {
            id,
            key,
            created,
            status: Status::Open,
            slots: vec![None; spec.quantifiers().len()],
            state: Some(FormulaState::new(spec)),
            evidence: Vec::new(),
        }
    }

    /// Binds (or rebinds) the `var`-th variable to the event,
    /// returning the number of values rejected for having the wrong type.
    pub(crate) fn bind(&mut self, spec: &Specification, var: usize, event: &Arc<Event>) -> u64 {
        let quantifier = &spec.quantifiers()[var];
        let mut mismatches = 0;
        let values = quantifier
            .fields
            .iter()
            .map(|field| {
                let val = event.value(&field.name)?;
                let coerced = val.clone().coerce(field.ty);
                if coerced.is_none() {
                    warn!(
                        "{}: value '{}' of event at {} has type {}, but {} is declared",
                        spec.name(),
                        field.name,
                        event.timestamp,
                        val.r#type(),
                        field.ty
                    );
                    mismatches += 1;
                }
                coerced
            })
            .collect();
        let current = Observation {
            timestamp: event.timestamp,
            values,
        };
        let slot = &mut self.slots[var];
        let previous = slot.take().map(|slot| slot.current);
        *slot = Some(Slot { current, previous });
        self.evidence.push(Arc::clone(event));
        trace!(
            "{}: binding {} ({}) bound '{}' at {}",
            spec.name(),
            self.id,
            self.key,
            quantifier.variable,
            event.timestamp
        );
        mismatches
    }

    /// Updates the formula state after `var` has been bound.
    pub(crate) fn evaluate(&mut self, spec: &Specification, var: usize) -> Option<bool> {
        self.state
            .as_mut()
            .and_then(|state| state.update(spec, &self.slots, var))
    }

    /// Records the verdict and releases the evaluation state.
    pub(crate) fn decide(
        &mut self,
        spec: &Specification,
        outcome: Outcome,
        decided_by: Decision,
    ) -> Verdict {
        self.status = match decided_by {
            Decision::Event(_) => Status::VerdictReached,
            Decision::ScopeClosure => Status::ScopeClosed,
        };
        self.state = None;
        self.slots.clear();
        let mut evidence = std::mem::take(&mut self.evidence);
        evidence.sort_by_key(|event| event.timestamp);
        trace!(
            "{}: binding {} ({}) decided {outcome}",
            spec.name(),
            self.id,
            self.key
        );
        Verdict {
            specification: Arc::clone(spec.name()),
            binding: self.id,
            scope: self.key,
            outcome,
            decided_by,
            evidence,
        }
    }

    /// Closes the binding's scope, yielding a verdict unless one was already recorded.
    pub(crate) fn close(&mut self, spec: &Specification, policy: ClosurePolicy) -> Option<Verdict> {
        if self.status != Status::Open {
            self.status = Status::ScopeClosed;
            return None;
        }
        let truth = self
            .state
            .as_mut()
            .and_then(|state| state.close(spec, policy));
        Some(self.decide(spec, Outcome::from(truth), Decision::ScopeClosure))
    }

    pub(crate) fn snapshot(&self, spec: &Specification) -> BindingSnapshot {
        BindingSnapshot {
            specification: Arc::clone(spec.name()),
            binding: self.id,
            scope: self.key,
            created: self.created,
            truth: self.state.as_ref().and_then(FormulaState::truth),
            bound: spec
                .quantifiers()
                .iter()
                .zip(&self.slots)
                .filter(|(_, slot)| slot.is_some())
                .map(|(q, _)| q.variable.clone())
                .collect(),
        }
    }
}
