use super::{
    CmpOp, Field, Node, Operand, Quantifier, RawArg, RawFormula, RawOperand, RawQuantifier,
    RawSpecification, Scope, Specification,
};
use crate::Type;
use log::{debug, trace};
use smallvec::SmallVec;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

/// The ways a specification can be malformed or ill-typed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecErrorKind {
    /// A specification needs at least one quantifier.
    #[error("no quantifier declared")]
    NoQuantifiers,
    /// A specification needs a check formula.
    #[error("missing check formula")]
    MissingCheck,
    /// A variable is declared twice.
    #[error("variable '{0}' declared twice")]
    DuplicateVariable(String),
    /// A quantifier declares the same field twice.
    #[error("field '{field}' declared twice by quantifier '{variable}'")]
    DuplicateField {
        /// The quantified variable.
        variable: String,
        /// The duplicated field.
        field: String,
    },
    /// Reference to a variable no quantifier declares.
    #[error("variable '{0}' is not declared")]
    UndeclaredVariable(String),
    /// Reference to a variable whose quantifier is declared after the check formula.
    #[error("variable '{0}' is referenced before its quantifier is declared")]
    ForwardReference(String),
    /// Reference to a field the quantifier does not declare.
    #[error("quantifier '{variable}' declares no field '{field}'")]
    UnknownField {
        /// The quantified variable.
        variable: String,
        /// The unknown field.
        field: String,
    },
    /// Operands whose types cannot be compared.
    #[error("cannot compare {lhs} with {rhs} in '{expr}'")]
    IncomparableOperands {
        /// The offending expression.
        expr: String,
        /// Type of the left-hand side.
        lhs: Type,
        /// Type of the right-hand side.
        rhs: Type,
    },
    /// Ordering comparison between unordered types.
    #[error("values of type {ty} are not ordered in '{expr}'")]
    UnorderedComparison {
        /// The offending expression.
        expr: String,
        /// The unordered type.
        ty: Type,
    },
    /// Comparison between literals only.
    #[error("comparison '{0}' does not involve any variable")]
    ConstantComparison(String),
    /// Operator applied to the wrong number of arguments.
    #[error("operator '{op}' expects {expected} arguments, found {found}")]
    Arity {
        /// The operator.
        op: String,
        /// Expected number of arguments.
        expected: usize,
        /// Given number of arguments.
        found: usize,
    },
    /// Operator argument of the wrong kind.
    #[error("argument {position} of '{op}' must be {expected}")]
    ArgumentKind {
        /// The operator.
        op: String,
        /// Position of the argument (from 0).
        position: usize,
        /// Description of the expected kind.
        expected: &'static str,
    },
    /// Operator name not recognized.
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    /// Quantifier with a scope differing from the opening quantifier's.
    #[error("quantifier '{variable}' has scope {found}, but the opening quantifier has scope {expected}")]
    ScopeMismatch {
        /// The quantified variable.
        variable: String,
        /// Declared scope.
        found: Scope,
        /// Scope of the opening quantifier.
        expected: Scope,
    },
    /// Exit point declared on a quantifier that cannot close a scope.
    #[error("quantifier '{0}' cannot declare an exit point")]
    MisplacedUntil(String),
    /// Per-occurrence scope with no exit point to terminate the occurrences.
    #[error("per-occurrence quantifier '{0}' needs an exit point")]
    MissingUntil(String),
}

/// Error raised when compiling a specification.
///
/// Compilation never succeeds partially: on error no [`Specification`] is produced.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("specification '{specification}': {kind}")]
pub struct SpecificationError {
    /// Name of the offending specification.
    pub specification: String,
    /// What is wrong with it.
    pub kind: SpecErrorKind,
}

/// Validates a [`RawSpecification`] and builds the corresponding [`Specification`].
pub fn compile(raw: RawSpecification) -> Result<Specification, SpecificationError> {
    let name = raw.name.clone();
    Compiler::default()
        .compile(raw)
        .map_err(|kind| SpecificationError {
            specification: name,
            kind,
        })
}

impl TryFrom<RawSpecification> for Specification {
    type Error = SpecificationError;

    fn try_from(value: RawSpecification) -> Result<Self, Self::Error> {
        compile(value)
    }
}

// Whether the opening point is the entry of the function the exit point leaves,
// as in `enter(f)` and `exit(f)`.
fn paired(opening: &str, until: &str) -> bool {
    opening
        .strip_prefix("enter")
        .zip(until.strip_prefix("exit"))
        .is_some_and(|(entered, exited)| entered == exited)
}

#[derive(Default)]
struct Compiler {
    quantifiers: Vec<Quantifier>,
    variables: HashMap<String, usize>,
    check_position: usize,
    nodes: Vec<Node>,
    transient: Vec<bool>,
}

impl Compiler {
    fn compile(mut self, raw: RawSpecification) -> Result<Specification, SpecErrorKind> {
        debug!(target: "build", "compiling specification '{}'", raw.name);
        if raw.quantifiers.is_empty() {
            return Err(SpecErrorKind::NoQuantifiers);
        }
        self.check_position = raw.check_position;
        for (idx, quantifier) in raw.quantifiers.into_iter().enumerate() {
            self.declare(idx, quantifier)?;
        }
        let check = raw.check.ok_or(SpecErrorKind::MissingCheck)?;
        let root = self.lower(&check, false)?;
        assert_eq!(root, self.nodes.len() - 1, "root is pushed last");

        let mut points: HashMap<String, SmallVec<[usize; 2]>> = HashMap::new();
        for (idx, quantifier) in self.quantifiers.iter().enumerate() {
            points.entry(quantifier.point.clone()).or_default().push(idx);
        }
        let opening = &self.quantifiers[0];
        let nested = opening.scope == Scope::PerOccurrence
            && opening
                .until
                .as_deref()
                .is_some_and(|until| paired(&opening.point, until));
        debug!(
            target: "build",
            "specification '{}' compiled to {} nodes",
            raw.name,
            self.nodes.len()
        );
        Ok(Specification {
            name: Arc::from(raw.name),
            quantifiers: self.quantifiers,
            nodes: self.nodes,
            transient: self.transient,
            points,
            nested,
        })
    }

    fn declare(&mut self, idx: usize, raw: RawQuantifier) -> Result<(), SpecErrorKind> {
        if self.variables.contains_key(&raw.variable) {
            return Err(SpecErrorKind::DuplicateVariable(raw.variable));
        }
        if let Some(opening) = self.quantifiers.first() {
            if raw.scope != opening.scope {
                return Err(SpecErrorKind::ScopeMismatch {
                    variable: raw.variable,
                    found: raw.scope,
                    expected: opening.scope,
                });
            }
            if raw.until.is_some() {
                return Err(SpecErrorKind::MisplacedUntil(raw.variable));
            }
        } else if raw.scope == Scope::Global && raw.until.is_some() {
            return Err(SpecErrorKind::MisplacedUntil(raw.variable));
        } else if raw.scope == Scope::PerOccurrence && raw.until.is_none() {
            return Err(SpecErrorKind::MissingUntil(raw.variable));
        }

        let mut fields: Vec<Field> = Vec::with_capacity(raw.fields.len());
        for (name, ty) in raw.fields {
            if fields.iter().any(|f| f.name == name) {
                return Err(SpecErrorKind::DuplicateField {
                    variable: raw.variable,
                    field: name,
                });
            }
            fields.push(Field { name, ty });
        }

        trace!(target: "build", "quantifier '{}' over '{}'", raw.variable, raw.point);
        self.variables.insert(raw.variable.clone(), idx);
        self.quantifiers.push(Quantifier {
            variable: raw.variable,
            point: raw.point,
            scope: raw.scope,
            fields,
            until: raw.until,
        });
        Ok(())
    }

    fn variable(&self, name: &str) -> Result<usize, SpecErrorKind> {
        match self.variables.get(name) {
            Some(&idx) if idx < self.check_position => Ok(idx),
            Some(_) => Err(SpecErrorKind::ForwardReference(name.to_owned())),
            None => Err(SpecErrorKind::UndeclaredVariable(name.to_owned())),
        }
    }

    fn field(&self, var: &str, field: &str) -> Result<(usize, usize, Type), SpecErrorKind> {
        let var_idx = self.variable(var)?;
        let quantifier = &self.quantifiers[var_idx];
        let field_idx =
            quantifier
                .field_index(field)
                .ok_or_else(|| SpecErrorKind::UnknownField {
                    variable: var.to_owned(),
                    field: field.to_owned(),
                })?;
        Ok((var_idx, field_idx, quantifier.fields[field_idx].ty))
    }

    fn operand(&self, raw: &RawOperand) -> Result<(Operand, Type), SpecErrorKind> {
        match raw {
            RawOperand::Field(var, field) => {
                let (var, field, ty) = self.field(var, field)?;
                Ok((Operand::Field { var, field }, ty))
            }
            RawOperand::Time(var) => Ok((Operand::Time(self.variable(var)?), Type::Integer)),
            RawOperand::Duration(from, to) => Ok((
                Operand::Duration(self.variable(from)?, self.variable(to)?),
                Type::Integer,
            )),
            RawOperand::Literal(val) => Ok((Operand::Const(val.clone()), val.r#type())),
        }
    }

    fn comparison(
        &self,
        op: CmpOp,
        raw_lhs: &RawOperand,
        raw_rhs: &RawOperand,
    ) -> Result<Node, SpecErrorKind> {
        let expr = || format!("{raw_lhs} {op} {raw_rhs}");
        let (lhs, lhs_ty) = self.operand(raw_lhs)?;
        let (rhs, rhs_ty) = self.operand(raw_rhs)?;
        if matches!((&lhs, &rhs), (Operand::Const(_), Operand::Const(_))) {
            return Err(SpecErrorKind::ConstantComparison(expr()));
        }
        if !lhs_ty.comparable(rhs_ty) {
            return Err(SpecErrorKind::IncomparableOperands {
                expr: expr(),
                lhs: lhs_ty,
                rhs: rhs_ty,
            });
        }
        if op.is_ordering() && !lhs_ty.ordered() {
            return Err(SpecErrorKind::UnorderedComparison {
                expr: expr(),
                ty: lhs_ty,
            });
        }
        Ok(Node::Atom(op, lhs, rhs))
    }

    fn push(&mut self, node: Node, transient: bool) -> usize {
        self.nodes.push(node);
        self.transient.push(transient);
        self.nodes.len() - 1
    }

    fn lower(&mut self, formula: &RawFormula, transient: bool) -> Result<usize, SpecErrorKind> {
        let node = match formula {
            RawFormula::Bool(b) => Node::Const(*b),
            RawFormula::Compare(op, lhs, rhs) => self.comparison(*op, lhs, rhs)?,
            RawFormula::Not(sub) => Node::Not(self.lower(sub, transient)?),
            RawFormula::And(subs) => Node::And(self.lower_all(subs, transient)?),
            RawFormula::Or(subs) => Node::Or(self.lower_all(subs, transient)?),
            RawFormula::Apply(op, args) => self.apply(op, args, transient)?,
        };
        Ok(self.push(node, transient))
    }

    fn lower_all(
        &mut self,
        subs: &[RawFormula],
        transient: bool,
    ) -> Result<SmallVec<[usize; 4]>, SpecErrorKind> {
        subs.iter().map(|sub| self.lower(sub, transient)).collect()
    }

    fn formula_arg(
        &mut self,
        op: &str,
        position: usize,
        arg: &RawArg,
        transient: bool,
    ) -> Result<usize, SpecErrorKind> {
        match arg {
            RawArg::Formula(formula) => self.lower(formula, transient),
            RawArg::Literal(crate::Val::Boolean(b)) => Ok(self.push(Node::Const(*b), transient)),
            _ => Err(SpecErrorKind::ArgumentKind {
                op: op.to_owned(),
                position,
                expected: "a formula",
            }),
        }
    }

    fn variable_arg(&self, op: &str, position: usize, arg: &RawArg) -> Result<usize, SpecErrorKind> {
        match arg {
            RawArg::Variable(var) => self.variable(var),
            _ => Err(SpecErrorKind::ArgumentKind {
                op: op.to_owned(),
                position,
                expected: "a variable",
            }),
        }
    }

    fn operand_arg(op: &str, position: usize, arg: &RawArg) -> Result<RawOperand, SpecErrorKind> {
        match arg {
            RawArg::Field(var, field) => Ok(RawOperand::Field(var.clone(), field.clone())),
            RawArg::Time(var) => Ok(RawOperand::Time(var.clone())),
            RawArg::Duration(from, to) => Ok(RawOperand::Duration(from.clone(), to.clone())),
            RawArg::Literal(val) => Ok(RawOperand::Literal(val.clone())),
            _ => Err(SpecErrorKind::ArgumentKind {
                op: op.to_owned(),
                position,
                expected: "an operand",
            }),
        }
    }

    // Resolves operator names and arities.
    fn apply(&mut self, op: &str, args: &[RawArg], transient: bool) -> Result<Node, SpecErrorKind> {
        let arity = |expected: usize| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(SpecErrorKind::Arity {
                    op: op.to_owned(),
                    expected,
                    found: args.len(),
                })
            }
        };
        match op {
            "not" => {
                arity(1)?;
                Ok(Node::Not(self.formula_arg(op, 0, &args[0], transient)?))
            }
            "and" | "or" => {
                let subs = args
                    .iter()
                    .enumerate()
                    .map(|(position, arg)| self.formula_arg(op, position, arg, transient))
                    .collect::<Result<SmallVec<[usize; 4]>, _>>()?;
                Ok(if op == "and" {
                    Node::And(subs)
                } else {
                    Node::Or(subs)
                })
            }
            "before" | "after" => {
                arity(2)?;
                let lhs = self.variable_arg(op, 0, &args[0])?;
                let rhs = self.variable_arg(op, 1, &args[1])?;
                Ok(if op == "before" {
                    Node::Before(lhs, rhs)
                } else {
                    Node::After(lhs, rhs)
                })
            }
            "during" => {
                arity(3)?;
                Ok(Node::During(
                    self.variable_arg(op, 0, &args[0])?,
                    self.variable_arg(op, 1, &args[1])?,
                    self.variable_arg(op, 2, &args[2])?,
                ))
            }
            "changes-to" | "changes_to" => {
                arity(2)?;
                let RawArg::Field(var, field) = &args[0] else {
                    return Err(SpecErrorKind::ArgumentKind {
                        op: op.to_owned(),
                        position: 0,
                        expected: "a field reference",
                    });
                };
                let (var, field, ty) = self.field(var, field)?;
                let RawArg::Literal(value) = &args[1] else {
                    return Err(SpecErrorKind::ArgumentKind {
                        op: op.to_owned(),
                        position: 1,
                        expected: "a literal",
                    });
                };
                if !ty.comparable(value.r#type()) {
                    return Err(SpecErrorKind::IncomparableOperands {
                        expr: format!("{op}({}, {})", args[0], args[1]),
                        lhs: ty,
                        rhs: value.r#type(),
                    });
                }
                Ok(Node::ChangesTo {
                    var,
                    field,
                    value: value.clone(),
                })
            }
            "eventually" => {
                arity(1)?;
                // Everything beneath `eventually` is evaluated pointwise.
                Ok(Node::Eventually(self.formula_arg(op, 0, &args[0], true)?))
            }
            _ => {
                let cmp =
                    CmpOp::from_symbol(op).ok_or(SpecErrorKind::UnknownOperator(op.to_owned()))?;
                arity(2)?;
                let lhs = Self::operand_arg(op, 0, &args[0])?;
                let rhs = Self::operand_arg(op, 1, &args[1])?;
                self.comparison(cmp, &lhs, &rhs)
            }
        }
    }
}
