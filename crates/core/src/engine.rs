use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::config::{ApprovalMode, EngineConfig};
use crate::domain::context::TripContext;
use crate::domain::policy::{normalize_key, OrgId, Policy, PolicyId, PolicyKind};
use crate::errors::EvaluationError;
use crate::resolver::PolicyCatalog;
use crate::rules::LeafTrace;

/// Severity of a single policy result or a whole verdict. Ordering is part of
/// the contract: `Stop > Warn > Pass`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOutcome {
    Pass,
    Warn,
    Stop,
}

/// One per (booking, policy) pair. Never mutated after creation; the external
/// storage layer persists these for audit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub policy_id: PolicyId,
    pub policy_version: u32,
    pub kind: PolicyKind,
    pub outcome: PolicyOutcome,
    pub message: String,
    pub details: BTreeMap<String, String>,
    pub evaluated_at: DateTime<Utc>,
}

/// An approver role implied by a triggered WARN/STOP policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverRequirement {
    pub role: String,
    pub policy_id: PolicyId,
}

/// Aggregated result of one booking evaluation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub overall: PolicyOutcome,
    pub requires_approval: bool,
    pub results: Vec<PolicyEvaluation>,
    pub required_approvers: Vec<ApproverRequirement>,
}

/// Runs every resolved policy against a context and aggregates the results.
/// Stateless between calls; safe to share across threads.
#[derive(Clone, Debug)]
pub struct EvaluationEngine {
    catalog: PolicyCatalog,
    config: EngineConfig,
}

impl EvaluationEngine {
    pub fn new(catalog: PolicyCatalog, config: EngineConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &PolicyCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluate_single(&self, org_id: &OrgId, context: &TripContext) -> Verdict {
        self.evaluate_single_at(org_id, context, Utc::now())
    }

    /// Evaluation with an explicit clock. The timestamp on each result is the
    /// only clock-dependent field, so pinned-`now` calls are fully
    /// deterministic.
    pub fn evaluate_single_at(
        &self,
        org_id: &OrgId,
        context: &TripContext,
        now: DateTime<Utc>,
    ) -> Verdict {
        let policies = self.catalog.resolve(org_id, context);
        self.evaluate_resolved(&policies, context, now)
    }

    pub fn evaluate_bulk(&self, org_id: &OrgId, contexts: &[TripContext]) -> Vec<Verdict> {
        self.evaluate_bulk_at(org_id, contexts, Utc::now())
    }

    /// Order-preserving, independent per context. The resolved policy set
    /// depends only on the employee's scope coordinates, which repeat heavily
    /// across options in one search, so resolution is cached per scope key
    /// instead of repeated per item.
    pub fn evaluate_bulk_at(
        &self,
        org_id: &OrgId,
        contexts: &[TripContext],
        now: DateTime<Utc>,
    ) -> Vec<Verdict> {
        let mut resolved: HashMap<(String, String, String), Vec<&Policy>> = HashMap::new();

        contexts
            .iter()
            .map(|context| {
                let key = (
                    normalize_key(&context.employee.region),
                    normalize_key(&context.employee.department),
                    normalize_key(&context.employee.level),
                );
                let policies = resolved
                    .entry(key)
                    .or_insert_with(|| self.catalog.resolve(org_id, context));
                self.evaluate_resolved(policies, context, now)
            })
            .collect()
    }

    pub fn evaluate_single_with_audit<S>(
        &self,
        org_id: &OrgId,
        context: &TripContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Verdict
    where
        S: AuditSink,
    {
        let verdict = self.evaluate_single(org_id, context);
        sink.emit(
            AuditEvent::new(
                audit.booking_id.clone(),
                audit.correlation_id.clone(),
                "evaluation.verdict_issued",
                AuditCategory::Evaluation,
                audit.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("overall", format!("{:?}", verdict.overall))
            .with_metadata("requires_approval", verdict.requires_approval.to_string())
            .with_metadata("policies_evaluated", verdict.results.len().to_string()),
        );
        verdict
    }

    fn evaluate_resolved(
        &self,
        policies: &[&Policy],
        context: &TripContext,
        now: DateTime<Utc>,
    ) -> Verdict {
        let mut results = Vec::with_capacity(policies.len());
        let mut required_approvers = Vec::new();

        for policy in policies {
            let evaluation = evaluate_policy(policy, context, now);
            if evaluation.outcome >= PolicyOutcome::Warn {
                if let Some(role) = &policy.approver_required {
                    required_approvers.push(ApproverRequirement {
                        role: role.clone(),
                        policy_id: policy.id.clone(),
                    });
                }
            }
            results.push(evaluation);
        }

        let overall = results
            .iter()
            .map(|result| result.outcome)
            .max()
            .unwrap_or(PolicyOutcome::Pass);
        let requires_approval = match self.config.approval_mode {
            ApprovalMode::AlwaysAsk => true,
            ApprovalMode::OnlyWhenNecessary => overall >= PolicyOutcome::Warn,
        };

        Verdict { overall, requires_approval, results, required_approvers }
    }
}

/// Maps one policy's rule result to an outcome. Rule errors resolve to STOP
/// with a system-flagged diagnostic: a broken rule never fails open.
fn evaluate_policy(policy: &Policy, context: &TripContext, now: DateTime<Utc>) -> PolicyEvaluation {
    let evaluated = policy
        .rule
        .validate()
        .map_err(EvaluationError::from)
        .and_then(|()| policy.rule.evaluate(context));

    match evaluated {
        Ok(outcome) if outcome.matched => {
            let (mapped, message) = match policy.kind {
                PolicyKind::HardStop => {
                    (PolicyOutcome::Stop, format!("{} blocked this booking", policy.name))
                }
                PolicyKind::SoftWarning => {
                    (PolicyOutcome::Warn, format!("{} flagged this booking", policy.name))
                }
                PolicyKind::TrackOnly => {
                    (PolicyOutcome::Pass, format!("{} recorded this booking", policy.name))
                }
            };

            let mut details = trace_details(&outcome.trace);
            if policy.kind == PolicyKind::TrackOnly {
                details.insert("tracked".to_string(), "true".to_string());
            }

            build_evaluation(policy, mapped, message, details, now)
        }
        Ok(_) => build_evaluation(
            policy,
            PolicyOutcome::Pass,
            format!("{} passed", policy.name),
            BTreeMap::new(),
            now,
        ),
        Err(error) => {
            let mut details = BTreeMap::new();
            details.insert("error".to_string(), error.to_string());
            details.insert("flagged_by".to_string(), "system".to_string());
            build_evaluation(
                policy,
                PolicyOutcome::Stop,
                format!("policy misconfigured: {error}"),
                details,
                now,
            )
        }
    }
}

fn build_evaluation(
    policy: &Policy,
    outcome: PolicyOutcome,
    message: String,
    details: BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> PolicyEvaluation {
    PolicyEvaluation {
        policy_id: policy.id.clone(),
        policy_version: policy.version,
        kind: policy.kind,
        outcome,
        message,
        details,
        evaluated_at: now,
    }
}

/// Structured threshold-vs-actual detail from the first matching leaf.
fn trace_details(trace: &[LeafTrace]) -> BTreeMap<String, String> {
    let mut details = BTreeMap::new();
    if let Some(leaf) = trace.iter().find(|leaf| leaf.matched) {
        details.insert("field".to_string(), leaf.field.clone());
        details.insert("operator".to_string(), leaf.operator.clone());
        details.insert("expected".to_string(), leaf.expected.clone());
        details.insert("actual".to_string(), leaf.actual.clone());
    }
    details
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::config::{ApprovalMode, EngineConfig};
    use crate::domain::context::{EmployeeProfile, FieldValue, TripContext};
    use crate::domain::policy::{OrgId, Policy, PolicyId, PolicyKind, PolicyScope};
    use crate::resolver::PolicyCatalog;
    use crate::rules::{ComparisonOp, ConditionNode};

    use super::{EvaluationEngine, PolicyOutcome};

    fn org() -> OrgId {
        OrgId("org-1".to_string())
    }

    fn context(total_cost: Decimal) -> TripContext {
        TripContext {
            total_cost,
            currency: "USD".to_string(),
            segments: Vec::new(),
            employee: EmployeeProfile {
                id: "emp-1".to_string(),
                level: "senior".to_string(),
                department: "sales".to_string(),
                region: "emea".to_string(),
            },
            advance_booking_days: 14,
            departure_date: None,
        }
    }

    fn cost_policy(id: &str, kind: PolicyKind, threshold: Decimal, priority: i32) -> Policy {
        Policy {
            id: PolicyId(id.to_string()),
            org_id: org(),
            name: id.to_string(),
            kind,
            category: "cost".to_string(),
            rule: ConditionNode::Leaf {
                field: "total_cost".to_string(),
                op: ComparisonOp::GreaterThan,
                value: FieldValue::Decimal(threshold),
            },
            scope: PolicyScope::default(),
            active: true,
            version: 1,
            priority,
            approver_required: Some("manager".to_string()),
        }
    }

    fn engine(policies: Vec<Policy>) -> EvaluationEngine {
        EvaluationEngine::new(PolicyCatalog::new(policies), EngineConfig::default())
    }

    #[test]
    fn triggered_kinds_map_to_their_outcomes() {
        let engine = engine(vec![
            cost_policy("hard", PolicyKind::HardStop, Decimal::new(100_000, 2), 10),
            cost_policy("soft", PolicyKind::SoftWarning, Decimal::new(100_000, 2), 20),
            cost_policy("track", PolicyKind::TrackOnly, Decimal::new(100_000, 2), 30),
        ]);

        let verdict = engine.evaluate_single(&org(), &context(Decimal::new(200_000, 2)));
        let outcomes: Vec<PolicyOutcome> =
            verdict.results.iter().map(|result| result.outcome).collect();
        assert_eq!(
            outcomes,
            vec![PolicyOutcome::Stop, PolicyOutcome::Warn, PolicyOutcome::Pass]
        );
        assert_eq!(verdict.overall, PolicyOutcome::Stop);
        assert!(verdict.requires_approval);
    }

    #[test]
    fn untriggered_rules_pass_regardless_of_kind() {
        let engine =
            engine(vec![cost_policy("hard", PolicyKind::HardStop, Decimal::new(900_000, 2), 10)]);
        let verdict = engine.evaluate_single(&org(), &context(Decimal::new(200_000, 2)));

        assert_eq!(verdict.overall, PolicyOutcome::Pass);
        assert!(!verdict.requires_approval);
        assert!(verdict.required_approvers.is_empty());
    }

    #[test]
    fn misconfigured_policy_stops_without_affecting_neighbours() {
        let mut broken = cost_policy("broken", PolicyKind::SoftWarning, Decimal::ONE, 5);
        broken.rule = ConditionNode::Leaf {
            field: "segment.nonexistent_field".to_string(),
            op: ComparisonOp::Equals,
            value: FieldValue::Int(1),
        };

        let engine = engine(vec![
            broken,
            cost_policy("healthy", PolicyKind::SoftWarning, Decimal::new(900_000, 2), 10),
        ]);
        let verdict = engine.evaluate_single(&org(), &context(Decimal::new(200_000, 2)));

        assert_eq!(verdict.results[0].outcome, PolicyOutcome::Stop);
        assert!(verdict.results[0].message.starts_with("policy misconfigured"));
        assert_eq!(verdict.results[0].details.get("flagged_by").map(String::as_str), Some("system"));
        assert_eq!(verdict.results[1].outcome, PolicyOutcome::Pass);
        assert_eq!(verdict.overall, PolicyOutcome::Stop);
    }

    #[test]
    fn always_ask_mode_requires_approval_on_clean_verdicts() {
        let config =
            EngineConfig { approval_mode: ApprovalMode::AlwaysAsk, ..EngineConfig::default() };
        let engine = EvaluationEngine::new(
            PolicyCatalog::new(vec![cost_policy(
                "hard",
                PolicyKind::HardStop,
                Decimal::new(900_000, 2),
                10,
            )]),
            config,
        );

        let verdict = engine.evaluate_single(&org(), &context(Decimal::new(100_000, 2)));
        assert_eq!(verdict.overall, PolicyOutcome::Pass);
        assert!(verdict.requires_approval);
    }

    #[test]
    fn bulk_matches_single_and_preserves_order() {
        let engine =
            engine(vec![cost_policy("hard", PolicyKind::HardStop, Decimal::new(500_000, 2), 10)]);
        let now = Utc::now();
        let contexts =
            vec![context(Decimal::new(600_000, 2)), context(Decimal::new(100_000, 2))];

        let verdicts = engine.evaluate_bulk_at(&org(), &contexts, now);
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0], engine.evaluate_single_at(&org(), &contexts[0], now));
        assert_eq!(verdicts[0].overall, PolicyOutcome::Stop);
        assert_eq!(verdicts[1].overall, PolicyOutcome::Pass);
    }

    #[test]
    fn evaluation_emits_audit_event() {
        let engine =
            engine(vec![cost_policy("hard", PolicyKind::HardStop, Decimal::new(500_000, 2), 10)]);
        let sink = InMemoryAuditSink::default();

        let _ = engine.evaluate_single_with_audit(
            &org(),
            &context(Decimal::new(600_000, 2)),
            &sink,
            &AuditContext::new(Some("bk-1".to_string()), "req-7", "booking-service"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "evaluation.verdict_issued");
        assert_eq!(events[0].metadata.get("overall").map(String::as_str), Some("Stop"));
    }
}
