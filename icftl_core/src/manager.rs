//! Creates, tracks and retires the bindings of one specification.

use crate::{
    ContextId, Event,
    binding::{Binding, BindingId, ScopeKey, Status},
    evaluator::ClosurePolicy,
    specification::{Scope, Specification},
    verdict::{BindingSnapshot, Decision, Outcome, Verdict},
};
use log::{debug, trace};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

/// Per-specification counters of discarded data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Event values dropped because of a type mismatch with the declared field.
    pub type_mismatches: u64,
    /// Events for nested per-occurrence quantifiers with no open occurrence.
    pub orphans: u64,
}

/// Maintains the bindings of a [`Specification`] and routes events to them.
///
/// Decided bindings are kept (without evaluation state) until their scope closes,
/// so that further events in the same scope do not open a new binding.
#[derive(Debug)]
pub struct BindingManager {
    spec: Arc<Specification>,
    policy: ClosurePolicy,
    bindings: BTreeMap<BindingId, Binding>,
    keys: HashMap<ScopeKey, BindingId>,
    // Stacks of open occurrences per context, innermost last.
    occurrences: HashMap<ContextId, Vec<BindingId>>,
    next_id: BindingId,
    next_occurrence: u64,
    diagnostics: Diagnostics,
}

impl BindingManager {
    /// Creates a manager with no bindings.
    pub fn new(spec: Arc<Specification>, policy: ClosurePolicy) -> Self {
        Self {
            spec,
            policy,
            bindings: BTreeMap::new(),
            keys: HashMap::new(),
            occurrences: HashMap::new(),
            next_id: 0,
            next_occurrence: 0,
            diagnostics: Diagnostics::default(),
        }
    }

    /// The managed specification.
    pub fn specification(&self) -> &Arc<Specification> {
        &self.spec
    }

    /// Counters of discarded data.
    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Number of bindings still collecting evidence.
    pub fn open_bindings(&self) -> usize {
        self.bindings
            .values()
            .filter(|b| b.status == Status::Open)
            .count()
    }

    /// Routes an event to the bindings of the matching quantifiers,
    /// pushing the verdicts it produces.
    ///
    /// Matching quantifiers are processed in declaration order;
    /// if the event's program point is the designated exit point,
    /// the scope is closed afterwards.
    pub fn on_event(&mut self, event: &Arc<Event>, verdicts: &mut Vec<Verdict>) {
        let spec = Arc::clone(&self.spec);
        for &var in spec.quantifiers_at(&event.point) {
            let Some(id) = self.target(var, event) else {
                debug!(
                    "{}: no open occurrence in context {} for '{}' at {}",
                    spec.name(),
                    event.context,
                    spec.quantifiers()[var].variable,
                    event.timestamp
                );
                self.diagnostics.orphans += 1;
                continue;
            };
            let Some(binding) = self.bindings.get_mut(&id) else {
                continue;
            };
            if binding.status != Status::Open {
                trace!("{}: binding {id} already decided", spec.name());
                continue;
            }
            self.diagnostics.type_mismatches += binding.bind(&spec, var, event);
            if let Some(truth) = binding.evaluate(&spec, var) {
                verdicts.push(binding.decide(
                    &spec,
                    Outcome::from(truth),
                    Decision::Event(event.timestamp),
                ));
            }
        }
        if spec.closes_at(&event.point) {
            self.close_scope(event.context, verdicts);
        }
    }

    // The binding an event for the `var`-th quantifier belongs to.
    fn target(&mut self, var: usize, event: &Event) -> Option<BindingId> {
        match self.spec.scope() {
            Scope::Global => Some(self.find_or_create(ScopeKey::Global, event)),
            Scope::PerContext => Some(self.find_or_create(ScopeKey::Context(event.context), event)),
            Scope::PerOccurrence if var == 0 => {
                let key = ScopeKey::Occurrence(event.context, self.next_occurrence);
                self.next_occurrence += 1;
                let id = self.create(key, event);
                self.occurrences.entry(event.context).or_default().push(id);
                Some(id)
            }
            Scope::PerOccurrence => self
                .occurrences
                .get(&event.context)
                .and_then(|stack| stack.last().copied()),
        }
    }

    fn find_or_create(&mut self, key: ScopeKey, event: &Event) -> BindingId {
        match self.keys.get(&key) {
            Some(&id) => id,
            None => self.create(key, event),
        }
    }

    fn create(&mut self, key: ScopeKey, event: &Event) -> BindingId {
        let id = self.next_id;
        self.next_id += 1;
        trace!("{}: new binding {id} ({key})", self.spec.name());
        self.bindings
            .insert(id, Binding::new(id, key, &self.spec, event.timestamp));
        self.keys.insert(key, id);
        id
    }

    fn close_scope(&mut self, context: ContextId, verdicts: &mut Vec<Verdict>) {
        let ids: Vec<BindingId> = match self.spec.scope() {
            Scope::Global => Vec::new(),
            Scope::PerContext => self
                .keys
                .remove(&ScopeKey::Context(context))
                .into_iter()
                .collect(),
            // The exit terminates the innermost call only.
            Scope::PerOccurrence if self.spec.nests_occurrences() => {
                let id = self.occurrences.get_mut(&context).and_then(Vec::pop);
                if self.occurrences.get(&context).is_some_and(Vec::is_empty) {
                    self.occurrences.remove(&context);
                }
                id.into_iter().collect()
            }
            Scope::PerOccurrence => self.occurrences.remove(&context).unwrap_or_default(),
        };
        if ids.is_empty() {
            debug!(
                "{}: exit point in context {context} with no open scope",
                self.spec.name()
            );
        }
        for id in ids {
            if let Some(mut binding) = self.bindings.remove(&id) {
                self.keys.remove(&binding.key);
                verdicts.extend(binding.close(&self.spec, self.policy));
            }
        }
    }

    /// Closes every scope, pushing the verdicts of the bindings that were still open.
    pub fn close_all(&mut self, verdicts: &mut Vec<Verdict>) {
        self.keys.clear();
        self.occurrences.clear();
        for (_, mut binding) in std::mem::take(&mut self.bindings) {
            verdicts.extend(binding.close(&self.spec, self.policy));
        }
    }

    /// The state of every binding still collecting evidence.
    pub fn snapshot(&self) -> Vec<BindingSnapshot> {
        self.bindings
            .values()
            .filter(|b| b.status == Status::Open)
            .map(|b| b.snapshot(&self.spec))
            .collect()
    }
}
