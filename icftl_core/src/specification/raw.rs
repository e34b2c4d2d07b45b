use super::{CmpOp, Scope};
use crate::{Type, Val};
use std::fmt::Display;

/// A quantifier declaration, as written in a specification source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuantifier {
    /// Name of the quantified variable.
    pub variable: String,
    /// Program point whose events bind the variable.
    pub point: String,
    /// Scope of the bindings.
    pub scope: Scope,
    /// Declared fields with their types.
    pub fields: Vec<(String, Type)>,
    /// Program point closing the scope.
    pub until: Option<String>,
}

impl RawQuantifier {
    /// Declares a (per-context) quantifier over the given program point.
    pub fn new(variable: impl Into<String>, point: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            point: point.into(),
            scope: Scope::default(),
            fields: Vec::new(),
            until: None,
        }
    }

    /// Sets the scope of the quantifier.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Declares interest in a typed event value.
    pub fn field(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.fields.push((name.into(), ty));
        self
    }

    /// Sets the program point closing the scope.
    pub fn until(mut self, point: impl Into<String>) -> Self {
        self.until = Some(point.into());
        self
    }
}

/// Operand of a comparison, before name resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOperand {
    /// `variable.field`
    Field(String, String),
    /// `time(variable)`
    Time(String),
    /// `duration(from, to)`
    Duration(String, String),
    /// A literal value.
    Literal(Val),
}

/// Argument of an operator application, before arity and kind resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum RawArg {
    /// A sub-formula.
    Formula(RawFormula),
    /// A bare variable name.
    Variable(String),
    /// `variable.field`
    Field(String, String),
    /// `time(variable)`
    Time(String),
    /// `duration(from, to)`
    Duration(String, String),
    /// A literal value.
    Literal(Val),
}

/// The quantifier-free part of a specification, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFormula {
    /// `true` or `false`.
    Bool(bool),
    /// Comparison of two operands.
    Compare(CmpOp, RawOperand, RawOperand),
    /// Negation.
    Not(Box<RawFormula>),
    /// Conjunction.
    And(Vec<RawFormula>),
    /// Disjunction.
    Or(Vec<RawFormula>),
    /// Named operator applied to a list of arguments (e.g. `before(x, y)`).
    Apply(String, Vec<RawArg>),
}

/// A specification as read from a source, to be validated by [`super::compile`].
///
/// Mirrors the shape of a source file: a sequence of quantifiers followed by a check formula.
/// Quantifiers declared after the check (if any) are kept to report forward references.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSpecification {
    /// Name of the specification.
    pub name: String,
    /// Quantifier declarations, in declaration order.
    pub quantifiers: Vec<RawQuantifier>,
    /// The check formula.
    pub check: Option<RawFormula>,
    /// Number of quantifiers declared before the check formula.
    pub check_position: usize,
}

impl RawSpecification {
    /// Creates an empty specification.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantifiers: Vec::new(),
            check: None,
            check_position: 0,
        }
    }

    /// Adds a new (innermost) quantifier.
    pub fn forall(mut self, quantifier: RawQuantifier) -> Self {
        self.quantifiers.push(quantifier);
        self
    }

    /// Sets the check formula, over the quantifiers declared so far.
    pub fn check(mut self, formula: RawFormula) -> Self {
        self.check = Some(formula);
        self.check_position = self.quantifiers.len();
        self
    }
}

impl Display for RawOperand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawOperand::Field(var, field) => write!(f, "{var}.{field}"),
            RawOperand::Time(var) => write!(f, "time({var})"),
            RawOperand::Duration(from, to) => write!(f, "duration({from}, {to})"),
            RawOperand::Literal(val) => write!(f, "{val}"),
        }
    }
}

impl Display for RawArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawArg::Formula(formula) => write!(f, "{formula}"),
            RawArg::Variable(var) => write!(f, "{var}"),
            RawArg::Field(var, field) => write!(f, "{var}.{field}"),
            RawArg::Time(var) => write!(f, "time({var})"),
            RawArg::Duration(from, to) => write!(f, "duration({from}, {to})"),
            RawArg::Literal(val) => write!(f, "{val}"),
        }
    }
}

impl Display for RawFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawFormula::Bool(b) => write!(f, "{b}"),
            RawFormula::Compare(op, lhs, rhs) => write!(f, "{lhs} {op} {rhs}"),
            RawFormula::Not(sub) => write!(f, "not ({sub})"),
            RawFormula::And(subs) | RawFormula::Or(subs) => {
                let sep = if matches!(self, RawFormula::And(_)) {
                    " and "
                } else {
                    " or "
                };
                let subs = subs.iter().map(|s| format!("({s})")).collect::<Vec<_>>();
                write!(f, "{}", subs.join(sep))
            }
            RawFormula::Apply(op, args) => {
                let args = args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
                write!(f, "{op}({})", args.join(", "))
            }
        }
    }
}
