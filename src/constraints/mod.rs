//! Feasibility checking: built-in hard constraints, the configurable rule
//! engine, and structured violation reporting.

pub mod checker;
pub mod rules;
pub mod violation;

pub use checker::{CheckOptions, FeasibilityChecker, InvariantViolation, Placement};
pub use rules::{ParamValue, Rule, RuleContext, RuleKind, RuleScope};
pub use violation::{Severity, Verdict, Violation, ViolationKind};
