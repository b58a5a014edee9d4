use serde::{Deserialize, Serialize};

use crate::domain::context::TripContext;
use crate::rules::ConditionNode;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    HardStop,
    SoftWarning,
    TrackOnly,
}

/// Applicability filters. An empty set means unrestricted, matching the
/// wildcard convention used for approver tiers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyScope {
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub departments: Vec<String>,
    #[serde(default)]
    pub employee_levels: Vec<String>,
}

impl PolicyScope {
    pub fn matches(&self, context: &TripContext) -> bool {
        scope_allows(&self.regions, &context.employee.region)
            && scope_allows(&self.departments, &context.employee.department)
            && scope_allows(&self.employee_levels, &context.employee.level)
    }
}

fn scope_allows(candidates: &[String], value: &str) -> bool {
    if candidates.is_empty() {
        return true;
    }

    let value = normalize_key(value);
    candidates.iter().map(|candidate| normalize_key(candidate)).any(|candidate| candidate == value)
}

pub(crate) fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// A versioned, scoped rule governing whether a booking needs intervention.
/// Edits create a new version; old versions are kept by the external store for
/// audit and never re-evaluated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub org_id: OrgId,
    pub name: String,
    pub kind: PolicyKind,
    pub category: String,
    pub rule: ConditionNode,
    #[serde(default)]
    pub scope: PolicyScope,
    pub active: bool,
    pub version: u32,
    pub priority: i32,
    #[serde(default)]
    pub approver_required: Option<String>,
}

impl Policy {
    pub fn applies_to(&self, context: &TripContext) -> bool {
        self.active && self.scope.matches(context)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::context::{EmployeeProfile, FieldValue, TripContext};
    use crate::rules::{ComparisonOp, ConditionNode};

    use super::{OrgId, Policy, PolicyId, PolicyKind, PolicyScope};

    fn context(region: &str, department: &str, level: &str) -> TripContext {
        TripContext {
            total_cost: Decimal::new(100_000, 2),
            currency: "USD".to_string(),
            segments: Vec::new(),
            employee: EmployeeProfile {
                id: "emp-1".to_string(),
                level: level.to_string(),
                department: department.to_string(),
                region: region.to_string(),
            },
            advance_booking_days: 10,
            departure_date: None,
        }
    }

    fn policy(scope: PolicyScope, active: bool) -> Policy {
        Policy {
            id: PolicyId("max-cost".to_string()),
            org_id: OrgId("org-1".to_string()),
            name: "Max trip cost".to_string(),
            kind: PolicyKind::SoftWarning,
            category: "cost".to_string(),
            rule: ConditionNode::Leaf {
                field: "total_cost".to_string(),
                op: ComparisonOp::GreaterThan,
                value: FieldValue::Decimal(Decimal::new(500_000, 2)),
            },
            scope,
            active,
            version: 1,
            priority: 10,
            approver_required: Some("manager".to_string()),
        }
    }

    #[test]
    fn empty_scope_is_unrestricted() {
        let policy = policy(PolicyScope::default(), true);
        assert!(policy.applies_to(&context("apac", "sales", "junior")));
    }

    #[test]
    fn scope_matching_is_case_insensitive() {
        let scope = PolicyScope {
            regions: vec!["EMEA".to_string()],
            departments: Vec::new(),
            employee_levels: Vec::new(),
        };
        let policy = policy(scope, true);

        assert!(policy.applies_to(&context("emea", "sales", "junior")));
        assert!(!policy.applies_to(&context("apac", "sales", "junior")));
    }

    #[test]
    fn inactive_policy_never_applies() {
        let policy = policy(PolicyScope::default(), false);
        assert!(!policy.applies_to(&context("emea", "sales", "junior")));
    }
}
