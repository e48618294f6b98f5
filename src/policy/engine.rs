use tracing::debug;

use super::condition::Condition;
use crate::auth::Identity;
use crate::types::{OperationKind, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub effect: Effect,
    pub operations: Vec<OperationKind>,
    /// When set, the rule decides access to this field only
    pub field: Option<String>,
    pub condition: Condition,
}

impl Rule {
    fn applies(&self, operation: OperationKind) -> bool {
        self.operations.contains(&operation)
    }
}

/// Ordered rule list for one entity. Order does not affect the outcome.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    rules: Vec<Rule>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(self, operations: &[OperationKind], condition: Condition) -> Self {
        self.rule(Effect::Allow, operations, None, condition)
    }

    pub fn deny(self, operations: &[OperationKind], condition: Condition) -> Self {
        self.rule(Effect::Deny, operations, None, condition)
    }

    pub fn allow_field(self, field: &str, operations: &[OperationKind], condition: Condition) -> Self {
        self.rule(Effect::Allow, operations, Some(field), condition)
    }

    pub fn deny_field(self, field: &str, operations: &[OperationKind], condition: Condition) -> Self {
        self.rule(Effect::Deny, operations, Some(field), condition)
    }

    fn rule(mut self, effect: Effect, operations: &[OperationKind], field: Option<&str>, condition: Condition) -> Self {
        self.rules.push(Rule {
            effect,
            operations: operations.to_vec(),
            field: field.map(str::to_string),
            condition,
        });
        self
    }

    /// Fields that carry at least one rule for `operation`
    pub fn governed_fields(&self, operation: OperationKind) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.applies(operation)) {
            if let Some(field) = rule.field.as_deref() {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }
}

/// Outcome of evaluating a policy for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Fields the caller may not see (read) or write (create/update)
    pub redacted: Vec<String>,
    pub reason: Option<String>,
}

impl Decision {
    pub fn is_redacted(&self, field: &str) -> bool {
        self.redacted.iter().any(|f| f == field)
    }
}

/// Evaluate `policy` for one record.
///
/// Entity-level rules decide the record: any matching deny wins, otherwise
/// any matching allow allows, otherwise it is denied. A field with rules of
/// its own is decided by those rules alone, with the same precedence, and
/// is redacted unless an allow matches. Field decisions never grant access
/// to a record the entity-level rules deny.
pub fn evaluate(policy: &PolicySet, identity: &Identity, operation: OperationKind, record: &Record) -> Decision {
    let (allowed, reason) = decide(
        policy.rules.iter().filter(|r| r.field.is_none() && r.applies(operation)),
        identity,
        record,
    );

    let redacted = policy
        .governed_fields(operation)
        .into_iter()
        .filter(|field| {
            let (field_allowed, _) = decide(
                policy.rules.iter().filter(|r| r.field.as_deref() == Some(*field) && r.applies(operation)),
                identity,
                record,
            );
            !field_allowed
        })
        .map(str::to_string)
        .collect();

    let decision = Decision { allowed, redacted, reason };
    debug!("Policy {} for {:?}: {:?}", operation, identity.id(), decision);
    decision
}

/// Evaluate a write against the stored record and against the record as it
/// would read after the write. Both must be allowed; redactions combine.
pub fn evaluate_change(
    policy: &PolicySet,
    identity: &Identity,
    operation: OperationKind,
    current: &Record,
    proposed: &Record,
) -> Decision {
    let mut decision = evaluate(policy, identity, operation, current);
    if !decision.allowed {
        return decision;
    }
    let after = evaluate(policy, identity, operation, proposed);
    if !after.allowed {
        return after;
    }
    for field in after.redacted {
        if !decision.is_redacted(&field) {
            decision.redacted.push(field);
        }
    }
    decision
}

fn decide<'a>(rules: impl Iterator<Item = &'a Rule>, identity: &Identity, record: &Record) -> (bool, Option<String>) {
    let mut allowed = false;
    for rule in rules {
        if !rule.condition.holds(identity, record) {
            continue;
        }
        match rule.effect {
            Effect::Deny => return (false, Some("denied by policy rule".to_string())),
            Effect::Allow => allowed = true,
        }
    }
    if allowed {
        (true, None)
    } else {
        (false, Some("no policy rule allows this operation".to_string()))
    }
}
