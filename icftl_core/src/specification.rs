//! Quantifier declarations and a flattened formula tree.
//!
//! A [`Specification`] is produced by [`compile`] from a [`RawSpecification`]
//! and is immutable afterwards: every binding created while monitoring
//! refers to it, but only ever owns its private evaluation state.

mod compiler;
mod raw;

pub use compiler::{SpecErrorKind, SpecificationError, compile};
pub use raw::{RawArg, RawFormula, RawOperand, RawQuantifier, RawSpecification};

use crate::{Type, Val};
use smallvec::SmallVec;
use std::{cmp::Ordering, collections::HashMap, fmt::Display, sync::Arc};

/// Lifetime boundary governing when bindings are created and retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// A single binding for the whole monitoring session.
    Global,
    /// One binding per execution context.
    #[default]
    PerContext,
    /// A fresh binding each time the opening program point fires.
    PerOccurrence,
}

impl Scope {
    /// Parses the name used by specification sources.
    pub fn from_name(name: &str) -> Option<Scope> {
        match name {
            "global" => Some(Scope::Global),
            "per-context" => Some(Scope::PerContext),
            "per-occurrence" => Some(Scope::PerOccurrence),
            _ => None,
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::PerContext => write!(f, "per-context"),
            Scope::PerOccurrence => write!(f, "per-occurrence"),
        }
    }
}

/// A typed event value a quantifier declares interest in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Name of the value in observation events.
    pub name: String,
    /// Declared type.
    pub ty: Type,
}

/// A (validated) quantifier declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantifier {
    /// Name of the quantified variable.
    pub variable: String,
    /// Program point whose events bind the variable.
    pub point: String,
    /// Scope of the bindings.
    pub scope: Scope,
    /// Values accepted from binding events.
    pub fields: Vec<Field>,
    /// Program point closing the scope, if any.
    pub until: Option<String>,
}

impl Quantifier {
    /// Position of the named field among the declared ones.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Comparison operators of atomic predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// Parses the operator symbol.
    pub fn from_symbol(symbol: &str) -> Option<CmpOp> {
        match symbol {
            "==" => Some(CmpOp::Eq),
            "!=" => Some(CmpOp::Ne),
            "<" => Some(CmpOp::Lt),
            "<=" => Some(CmpOp::Le),
            ">" => Some(CmpOp::Gt),
            ">=" => Some(CmpOp::Ge),
            _ => None,
        }
    }

    /// The operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    /// Whether the operator requires ordered operand types.
    pub fn is_ordering(&self) -> bool {
        !matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    /// Whether the comparison holds for the given outcome of [`Val::compare`].
    pub fn holds(&self, ordering: Option<Ordering>) -> bool {
        match self {
            CmpOp::Eq => ordering == Some(Ordering::Equal),
            CmpOp::Ne => ordering != Some(Ordering::Equal),
            CmpOp::Lt => ordering == Some(Ordering::Less),
            CmpOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            CmpOp::Gt => ordering == Some(Ordering::Greater),
            CmpOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

impl Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Operand of an atomic predicate, resolved against the quantifier declarations.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Value of the `field`-th declared field of the `var`-th variable.
    Field {
        /// Variable index.
        var: usize,
        /// Field index.
        field: usize,
    },
    /// Timestamp of the event binding the variable.
    Time(usize),
    /// Time elapsed from the event binding the first variable to the one binding the second.
    Duration(usize, usize),
    /// A literal.
    Const(Val),
}

/// A node of the flattened formula tree.
///
/// Sub-formulae are referenced by their index, which is always smaller than the index of the node itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A constant truth value.
    Const(bool),
    /// Comparison between two operands.
    Atom(CmpOp, Operand, Operand),
    /// Negation.
    Not(usize),
    /// Conjunction.
    And(SmallVec<[usize; 4]>),
    /// Disjunction.
    Or(SmallVec<[usize; 4]>),
    /// The event binding the first variable precedes the one binding the second.
    Before(usize, usize),
    /// The event binding the first variable follows the one binding the second.
    After(usize, usize),
    /// The event binding the second variable lies strictly between the other two.
    During(usize, usize, usize),
    /// A field of a variable changes to the given value.
    ChangesTo {
        /// Variable index.
        var: usize,
        /// Field index.
        field: usize,
        /// Target value.
        value: Val,
    },
    /// The sub-formula holds at some point within the binding's scope.
    Eventually(usize),
}

/// A validated, immutable specification.
#[derive(Debug, Clone)]
pub struct Specification {
    pub(crate) name: Arc<str>,
    pub(crate) quantifiers: Vec<Quantifier>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) transient: Vec<bool>,
    pub(crate) points: HashMap<String, SmallVec<[usize; 2]>>,
    pub(crate) nested: bool,
}

impl Specification {
    /// Name of the specification.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Quantifier declarations, in declaration order.
    pub fn quantifiers(&self) -> &[Quantifier] {
        &self.quantifiers
    }

    /// Scope of the bindings, set by the opening quantifier.
    pub fn scope(&self) -> Scope {
        self.quantifiers[0].scope
    }

    /// Program point closing the bindings' scope, if any.
    pub fn until(&self) -> Option<&str> {
        self.quantifiers[0].until.as_deref()
    }

    /// Whether per-occurrence scopes nest like calls.
    ///
    /// That is the case when the opening point is the entry of the function whose exit closes the scope
    /// (e.g. `enter(f)` until `exit(f)`): an exit then closes the innermost open occurrence only.
    /// Otherwise, an exit closes every open occurrence of its context.
    pub fn nests_occurrences(&self) -> bool {
        self.nested
    }

    /// The nodes of the formula tree, children before parents.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Index of the top-level formula.
    pub fn root(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Whether the node is evaluated pointwise (i.e., it lies beneath an `eventually`).
    pub fn is_transient(&self, node: usize) -> bool {
        self.transient[node]
    }

    /// Indices of the quantifiers bound by events at the given program point, in declaration order.
    pub fn quantifiers_at(&self, point: &str) -> &[usize] {
        self.points.get(point).map(|q| q.as_slice()).unwrap_or(&[])
    }

    /// Whether events at the given program point close the bindings' scope.
    pub fn closes_at(&self, point: &str) -> bool {
        self.until().is_some_and(|until| until == point)
    }

    /// All the program points the specification is interested in.
    pub fn points(&self) -> impl Iterator<Item = &str> {
        self.points
            .keys()
            .map(String::as_str)
            .chain(self.until().filter(|p| !self.points.contains_key(*p)))
    }

    fn fmt_operand(&self, operand: &Operand, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match operand {
            Operand::Field { var, field } => {
                let q = &self.quantifiers[*var];
                write!(f, "{}.{}", q.variable, q.fields[*field].name)
            }
            Operand::Time(var) => write!(f, "time({})", self.quantifiers[*var].variable),
            Operand::Duration(from, to) => write!(
                f,
                "duration({}, {})",
                self.quantifiers[*from].variable, self.quantifiers[*to].variable
            ),
            Operand::Const(val) => write!(f, "{val}"),
        }
    }

    fn fmt_node(&self, idx: usize, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let var = |v: &usize| self.quantifiers[*v].variable.as_str();
        match &self.nodes[idx] {
            Node::Const(b) => write!(f, "{b}"),
            Node::Atom(op, lhs, rhs) => {
                self.fmt_operand(lhs, f)?;
                write!(f, " {op} ")?;
                self.fmt_operand(rhs, f)
            }
            Node::Not(sub) => {
                write!(f, "not (")?;
                self.fmt_node(*sub, f)?;
                write!(f, ")")
            }
            Node::And(subs) | Node::Or(subs) => {
                let sep = if matches!(self.nodes[idx], Node::And(_)) {
                    " and "
                } else {
                    " or "
                };
                write!(f, "(")?;
                for (i, sub) in subs.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{sep}")?;
                    }
                    self.fmt_node(*sub, f)?;
                }
                write!(f, ")")
            }
            Node::Before(a, b) => write!(f, "before({}, {})", var(a), var(b)),
            Node::After(a, b) => write!(f, "after({}, {})", var(a), var(b)),
            Node::During(a, b, c) => write!(f, "during({}, {}, {})", var(a), var(b), var(c)),
            Node::ChangesTo { var: v, field, value } => {
                let q = &self.quantifiers[*v];
                write!(
                    f,
                    "changes-to({}.{}, {value})",
                    q.variable, q.fields[*field].name
                )
            }
            Node::Eventually(sub) => {
                write!(f, "eventually(")?;
                self.fmt_node(*sub, f)?;
                write!(f, ")")
            }
        }
    }
}

impl Display for Specification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "spec {} {{", self.name)?;
        for q in &self.quantifiers {
            write!(f, "    forall {} in {} {}", q.variable, q.point, q.scope)?;
            if !q.fields.is_empty() {
                let fields = q
                    .fields
                    .iter()
                    .map(|field| format!("{}: {}", field.name, field.ty))
                    .collect::<Vec<_>>();
                write!(f, " {{ {} }}", fields.join(", "))?;
            }
            if let Some(until) = &q.until {
                write!(f, " until {until}")?;
            }
            writeln!(f, ";")?;
        }
        write!(f, "    check ")?;
        self.fmt_node(self.root(), f)?;
        write!(f, "\n}}")
    }
}
