//! Incremental three-valued evaluation of a binding's formula tree.
//!
//! Truth values are `Option<bool>`, where `None` stands for *unknown*.
//! Nodes are stored children-first, so a single forward pass recomputes the whole tree.
//! Once decided, a node is frozen and never recomputed,
//! except for the (transient) nodes beneath an `eventually`,
//! which are evaluated pointwise against the binding's current values.

use crate::{
    Val,
    binding::Slot,
    specification::{Node, Operand, Specification},
};
use std::borrow::Cow;

/// What an undecided `eventually` or `changes-to` becomes when its binding's scope closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosurePolicy {
    /// The awaited condition never held within the scope: the node becomes false.
    #[default]
    False,
    /// The node stays unknown, so that the verdict may be inconclusive.
    Inconclusive,
}

/// The private evaluation state of a binding's formula tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaState {
    truths: Vec<Option<bool>>,
}

impl FormulaState {
    /// Creates the state for the given specification, with every node unknown.
    pub fn new(spec: &Specification) -> Self {
        Self {
            truths: vec![None; spec.nodes().len()],
        }
    }

    /// Current truth value of the top-level formula.
    pub fn truth(&self) -> Option<bool> {
        self.truths.last().copied().flatten()
    }

    /// Current truth value of the given node.
    pub fn node(&self, idx: usize) -> Option<bool> {
        self.truths[idx]
    }

    /// Recomputes the tree after the `updated` variable has been (re)bound,
    /// returning the truth value of the top-level formula.
    pub(crate) fn update(
        &mut self,
        spec: &Specification,
        slots: &[Option<Slot>],
        updated: usize,
    ) -> Option<bool> {
        for (idx, node) in spec.nodes().iter().enumerate() {
            let transient = spec.is_transient(idx);
            if !transient && self.truths[idx].is_some() {
                continue;
            }
            let truth = match node {
                Node::Const(b) => Some(*b),
                Node::Atom(op, lhs, rhs) => {
                    match (operand(lhs, slots), operand(rhs, slots)) {
                        (Some(lhs), Some(rhs)) => lhs.compare(&rhs).ok().map(|ord| op.holds(ord)),
                        _ => None,
                    }
                }
                Node::Before(a, b) => timestamps(slots, [*a, *b]).map(|[a, b]| a < b),
                Node::After(a, b) => timestamps(slots, [*a, *b]).map(|[a, b]| a > b),
                Node::During(a, b, c) => {
                    timestamps(slots, [*a, *b, *c]).map(|[a, b, c]| a < b && b < c)
                }
                Node::ChangesTo { var, field, value } => {
                    let change = changes_to(slots, *var, *field, value, updated);
                    if transient {
                        change
                    } else {
                        // Before the change happens, it may still happen later.
                        change.filter(|changed| *changed)
                    }
                }
                Node::Eventually(sub) => self.truths[*sub].filter(|holds| *holds),
                Node::Not(_) | Node::And(_) | Node::Or(_) => self.connective(node),
            };
            self.truths[idx] = truth;
        }
        self.truth()
    }

    /// Applies the closure policy to the undecided nodes and re-evaluates the tree,
    /// returning the final truth value of the top-level formula.
    pub(crate) fn close(&mut self, spec: &Specification, policy: ClosurePolicy) -> Option<bool> {
        for (idx, node) in spec.nodes().iter().enumerate() {
            if spec.is_transient(idx) || self.truths[idx].is_some() {
                continue;
            }
            self.truths[idx] = match node {
                Node::Eventually(_) | Node::ChangesTo { .. } => match policy {
                    ClosurePolicy::False => Some(false),
                    ClosurePolicy::Inconclusive => None,
                },
                Node::Not(_) | Node::And(_) | Node::Or(_) => self.connective(node),
                _ => None,
            };
        }
        self.truth()
    }

    // Kleene semantics: decided as soon as any child decides the outcome.
    fn connective(&self, node: &Node) -> Option<bool> {
        match node {
            Node::Not(sub) => self.truths[*sub].map(|b| !b),
            Node::And(subs) => {
                let mut truth = Some(true);
                for sub in subs {
                    match self.truths[*sub] {
                        Some(false) => return Some(false),
                        None => truth = None,
                        Some(true) => {}
                    }
                }
                truth
            }
            Node::Or(subs) => {
                let mut truth = Some(false);
                for sub in subs {
                    match self.truths[*sub] {
                        Some(true) => return Some(true),
                        None => truth = None,
                        Some(false) => {}
                    }
                }
                truth
            }
            _ => unreachable!("not a connective"),
        }
    }
}

fn operand<'a>(operand: &'a Operand, slots: &'a [Option<Slot>]) -> Option<Cow<'a, Val>> {
    match operand {
        Operand::Field { var, field } => slots[*var]
            .as_ref()
            .and_then(|slot| slot.current.values[*field].as_ref())
            .map(Cow::Borrowed),
        Operand::Time(var) => timestamps(slots, [*var])
            .and_then(|[time]| i64::try_from(time).ok())
            .map(|time| Cow::Owned(Val::Integer(time))),
        Operand::Duration(from, to) => timestamps(slots, [*from, *to])
            .and_then(|[from, to]| {
                let from = i64::try_from(from).ok()?;
                i64::try_from(to).ok()?.checked_sub(from)
            })
            .map(|duration| Cow::Owned(Val::Integer(duration))),
        Operand::Const(val) => Some(Cow::Borrowed(val)),
    }
}

fn timestamps<const N: usize>(slots: &[Option<Slot>], vars: [usize; N]) -> Option<[u64; N]> {
    let mut stamps = [0; N];
    for (stamp, var) in stamps.iter_mut().zip(vars) {
        *stamp = slots[var].as_ref()?.current.timestamp;
    }
    Some(stamps)
}

// Whether the latest update of `var` changed `field` to `value`;
// unknown until two observations exist.
fn changes_to(
    slots: &[Option<Slot>],
    var: usize,
    field: usize,
    value: &Val,
    updated: usize,
) -> Option<bool> {
    let slot = slots[var].as_ref()?;
    let previous = slot.previous.as_ref()?;
    if updated != var {
        return Some(false);
    }
    let equals = |val: &Option<Val>| {
        val.as_ref()
            .is_some_and(|val| matches!(val.compare(value), Ok(Some(std::cmp::Ordering::Equal))))
    };
    Some(equals(&slot.current.values[field]) && !equals(&previous.values[field]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CmpOp, RawArg, RawFormula, RawOperand, RawQuantifier, RawSpecification, Type,
        binding::Observation, compile,
    };
    use smallvec::smallvec;

    fn slot(timestamp: u64, value: Option<i64>) -> Option<Slot> {
        Some(Slot {
            current: Observation {
                timestamp,
                values: smallvec![value.map(Val::Integer)],
            },
            previous: None,
        })
    }

    fn rebind(slot: &mut Option<Slot>, timestamp: u64, value: i64) {
        let previous = slot.take().map(|s| s.current);
        *slot = Some(Slot {
            current: Observation {
                timestamp,
                values: smallvec![Some(Val::Integer(value))],
            },
            previous,
        });
    }

    fn two_vars(check: RawFormula) -> Specification {
        compile(
            RawSpecification::new("s")
                .forall(RawQuantifier::new("x", "enter(f)").field("value", Type::Integer))
                .forall(RawQuantifier::new("y", "enter(g)").field("value", Type::Integer))
                .check(check),
        )
        .expect("compile")
    }

    fn positive(var: &str) -> RawFormula {
        RawFormula::Compare(
            CmpOp::Gt,
            RawOperand::Field(var.into(), "value".into()),
            RawOperand::Literal(Val::Integer(0)),
        )
    }

    #[test]
    fn short_circuit() {
        let spec = two_vars(RawFormula::And(vec![positive("x"), positive("y")]));
        let mut state = FormulaState::new(&spec);
        let slots = vec![slot(1, Some(-1)), None];
        assert_eq!(state.update(&spec, &slots, 0), Some(false));
    }

    #[test]
    fn conjunction_waits() {
        let spec = two_vars(RawFormula::And(vec![positive("x"), positive("y")]));
        let mut state = FormulaState::new(&spec);
        let mut slots = vec![slot(1, Some(1)), None];
        assert_eq!(state.update(&spec, &slots, 0), None);
        slots[1] = slot(2, Some(3));
        assert_eq!(state.update(&spec, &slots, 1), Some(true));
    }

    #[test]
    fn decided_atoms_freeze() {
        let spec = two_vars(RawFormula::Or(vec![positive("x"), positive("y")]));
        let mut state = FormulaState::new(&spec);
        let mut slots = vec![slot(1, Some(-1)), None];
        assert_eq!(state.update(&spec, &slots, 0), None);
        assert_eq!(state.node(0), Some(false));
        rebind(&mut slots[0], 2, 5);
        assert_eq!(state.update(&spec, &slots, 0), None);
        assert_eq!(state.node(0), Some(false));
    }

    #[test]
    fn temporal_order() {
        let spec = two_vars(RawFormula::Apply(
            "before".into(),
            vec![RawArg::Variable("x".into()), RawArg::Variable("y".into())],
        ));
        let mut state = FormulaState::new(&spec);
        let mut slots = vec![None, slot(2, None)];
        assert_eq!(state.update(&spec, &slots, 1), None);
        slots[0] = slot(1, None);
        assert_eq!(state.update(&spec, &slots, 0), Some(true));
    }

    #[test]
    fn after() {
        let spec = two_vars(RawFormula::Apply(
            "after".into(),
            vec![RawArg::Variable("x".into()), RawArg::Variable("y".into())],
        ));
        let slots = vec![slot(5, None), slot(2, None)];
        assert_eq!(FormulaState::new(&spec).update(&spec, &slots, 0), Some(true));
        let slots = vec![slot(2, None), slot(5, None)];
        assert_eq!(FormulaState::new(&spec).update(&spec, &slots, 1), Some(false));
    }

    fn during() -> Specification {
        compile(
            RawSpecification::new("s")
                .forall(RawQuantifier::new("a", "enter(f)"))
                .forall(RawQuantifier::new("b", "calls(g)"))
                .forall(RawQuantifier::new("c", "exit(f)"))
                .check(RawFormula::Apply(
                    "during".into(),
                    vec![
                        RawArg::Variable("a".into()),
                        RawArg::Variable("b".into()),
                        RawArg::Variable("c".into()),
                    ],
                )),
        )
        .expect("compile")
    }

    #[test]
    fn during_is_strict() {
        let spec = during();
        let truth = |a, b, c| {
            let slots = vec![slot(a, None), slot(b, None), slot(c, None)];
            FormulaState::new(&spec).update(&spec, &slots, 2)
        };
        assert_eq!(truth(1, 2, 3), Some(true));
        assert_eq!(truth(1, 1, 3), Some(false));
        assert_eq!(truth(1, 3, 3), Some(false));
        assert_eq!(truth(2, 1, 3), Some(false));
        assert_eq!(truth(1, 4, 3), Some(false));
        // Unknown until all three are bound.
        let slots = vec![slot(1, None), slot(2, None), None];
        assert_eq!(FormulaState::new(&spec).update(&spec, &slots, 1), None);
    }

    fn within(limit: Val) -> Specification {
        two_vars(RawFormula::Compare(
            CmpOp::Lt,
            RawOperand::Duration("x".into(), "y".into()),
            RawOperand::Literal(limit),
        ))
    }

    #[test]
    fn durations() {
        let spec = within(Val::Integer(10));
        let slots = vec![slot(100, None), slot(104, None)];
        assert_eq!(FormulaState::new(&spec).update(&spec, &slots, 1), Some(true));
        let slots = vec![slot(100, None), slot(110, None)];
        assert_eq!(FormulaState::new(&spec).update(&spec, &slots, 1), Some(false));
        let slots = vec![slot(100, None), None];
        assert_eq!(FormulaState::new(&spec).update(&spec, &slots, 0), None);

        let spec = within(Val::Float(4.5));
        let slots = vec![slot(100, None), slot(104, None)];
        assert_eq!(FormulaState::new(&spec).update(&spec, &slots, 1), Some(true));
    }

    #[test]
    fn timestamps_beyond_integers_stay_unknown() {
        let spec = two_vars(RawFormula::Compare(
            CmpOp::Gt,
            RawOperand::Time("x".into()),
            RawOperand::Literal(Val::Integer(0)),
        ));
        let slots = vec![slot(u64::MAX, None), None];
        assert_eq!(FormulaState::new(&spec).update(&spec, &slots, 0), None);
        let slots = vec![slot(i64::MAX as u64, None), None];
        assert_eq!(FormulaState::new(&spec).update(&spec, &slots, 0), Some(true));

        let spec = within(Val::Integer(10));
        let slots = vec![slot(1, None), slot(u64::MAX, None)];
        assert_eq!(FormulaState::new(&spec).update(&spec, &slots, 1), None);
    }

    #[test]
    fn eventually_and_closure() {
        let spec = two_vars(RawFormula::Apply(
            "eventually".into(),
            vec![RawArg::Formula(RawFormula::Compare(
                CmpOp::Eq,
                RawOperand::Field("x".into(), "value".into()),
                RawOperand::Literal(Val::Integer(0)),
            ))],
        ));
        let mut slots = vec![slot(1, Some(3)), None];
        let mut state = FormulaState::new(&spec);
        assert_eq!(state.update(&spec, &slots, 0), None);
        let mut closed = state.clone();
        assert_eq!(closed.close(&spec, ClosurePolicy::False), Some(false));
        let mut closed = state.clone();
        assert_eq!(closed.close(&spec, ClosurePolicy::Inconclusive), None);

        rebind(&mut slots[0], 2, 0);
        assert_eq!(state.update(&spec, &slots, 0), Some(true));
        rebind(&mut slots[0], 3, 4);
        assert_eq!(state.update(&spec, &slots, 0), Some(true));
    }

    #[test]
    fn changes_to_needs_two_observations() {
        let spec = two_vars(RawFormula::Apply(
            "changes-to".into(),
            vec![
                RawArg::Field("x".into(), "value".into()),
                RawArg::Literal(Val::Integer(7)),
            ],
        ));
        let mut slots = vec![slot(1, Some(7)), None];
        let mut state = FormulaState::new(&spec);
        assert_eq!(state.update(&spec, &slots, 0), None);
        rebind(&mut slots[0], 2, 7);
        assert_eq!(state.update(&spec, &slots, 0), None);
        rebind(&mut slots[0], 3, 1);
        assert_eq!(state.update(&spec, &slots, 0), None);
        rebind(&mut slots[0], 4, 7);
        assert_eq!(state.update(&spec, &slots, 0), Some(true));
    }
}
