//! Declarative access policies and their evaluation.
//!
//! A `PolicySet` belongs to an entity schema. Rules are `allow` or `deny`,
//! scoped to one or more operation kinds and optionally narrowed to a
//! single field. Evaluation is a pure function of
//! `(policy, identity, operation, record)` and never touches storage;
//! writes are checked against both the stored and the proposed record.

pub mod condition;
pub mod engine;

pub use condition::Condition;
pub use engine::{evaluate, evaluate_change, Decision, Effect, PolicySet, Rule};
