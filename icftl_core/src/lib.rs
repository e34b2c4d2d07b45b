//! Online runtime verification of inter-procedural temporal properties (iCFTL).
//!
//! Specifications are made of quantifiers, binding variables to observation events
//! at given program points, and of a three-valued formula over the bound variables.
//! A [`RawSpecification`] is validated by [`compile`] into an immutable [`Specification`].
//! The [`Monitor`] consumes [`Event`]s submitted by an instrumented program,
//! tracks a binding of the quantified variables per scope through a [`BindingManager`],
//! evaluates the formula incrementally and reports a [`Verdict`] for each binding
//! to a [`VerdictSink`].
//!
//! ```
//! use icftl_core::*;
//!
//! let spec = compile(
//!     RawSpecification::new("positive")
//!         .forall(RawQuantifier::new("x", "enter(f)").field("value", Type::Integer))
//!         .check(RawFormula::Compare(
//!             CmpOp::Gt,
//!             RawOperand::Field("x".into(), "value".into()),
//!             RawOperand::Literal(Val::Integer(0)),
//!         )),
//! )
//! .unwrap();
//! let log = VerdictLog::new();
//! let monitor = Monitor::start([spec], MonitorConfig::default(), log.clone()).unwrap();
//! monitor
//!     .submit(Event::new(1, "enter(f)", 1).with_value("value", 5i64))
//!     .unwrap();
//! monitor.stop().unwrap();
//! assert_eq!(log.verdicts()[0].outcome, Outcome::True);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod binding;
mod evaluator;
mod event;
mod manager;
mod monitor;
mod specification;
mod value;
mod verdict;

pub use binding::{BindingId, ScopeKey, Status};
pub use evaluator::{ClosurePolicy, FormulaState};
pub use event::Event;
pub use manager::{BindingManager, Diagnostics};
pub use monitor::{
    Backpressure, Monitor, MonitorConfig, MonitorError, MonitorStats, Session, Submitter,
};
pub use specification::{
    CmpOp, Field, Node, Operand, Quantifier, RawArg, RawFormula, RawOperand, RawQuantifier,
    RawSpecification, Scope, SpecErrorKind, Specification, SpecificationError, compile,
};
pub use value::{ContextId, Float, Integer, Timestamp, Type, TypeError, Val};
pub use verdict::{BindingSnapshot, Decision, Outcome, Verdict, VerdictLog, VerdictSink};
