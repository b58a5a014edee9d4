//! End-to-end scenarios: policy resolution, evaluation, routing, and the
//! approval state machine wired together the way a booking service uses them.

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use waypoint_core::approvals::routing::{
    DirectoryEntry, InMemoryEmployeeDirectory, WorkflowBuilder,
};
use waypoint_core::approvals::{BookingId, StepStatus, WorkflowMachine, WorkflowStatus};
use waypoint_core::config::EngineConfig;
use waypoint_core::domain::context::{EmployeeProfile, FieldValue, TripContext, TripSegment};
use waypoint_core::domain::policy::{OrgId, Policy, PolicyId, PolicyKind, PolicyScope};
use waypoint_core::engine::{EvaluationEngine, PolicyOutcome};
use waypoint_core::resolver::PolicyCatalog;
use waypoint_core::rules::{Combinator, ComparisonOp, ConditionNode};

fn org() -> OrgId {
    OrgId("acme".to_string())
}

fn flight(cabin: &str, price: Decimal, duration_minutes: i64) -> TripSegment {
    TripSegment {
        kind: "flight".to_string(),
        cabin_class: Some(cabin.to_string()),
        fare_class: None,
        duration_minutes: Some(duration_minutes),
        price,
        departure_date: None,
    }
}

fn trip(total_cost: Decimal, segments: Vec<TripSegment>) -> TripContext {
    TripContext {
        total_cost,
        currency: "USD".to_string(),
        segments,
        employee: EmployeeProfile {
            id: "u-alice".to_string(),
            level: "senior".to_string(),
            department: "engineering".to_string(),
            region: "emea".to_string(),
        },
        advance_booking_days: 21,
        departure_date: None,
    }
}

fn leaf(field: &str, op: ComparisonOp, value: FieldValue) -> ConditionNode {
    ConditionNode::Leaf { field: field.to_string(), op, value }
}

fn policy(id: &str, kind: PolicyKind, rule: ConditionNode, approver: Option<&str>) -> Policy {
    Policy {
        id: PolicyId(id.to_string()),
        org_id: org(),
        name: id.replace('-', " "),
        kind,
        category: "travel".to_string(),
        rule,
        scope: PolicyScope::default(),
        active: true,
        version: 1,
        priority: 100,
        approver_required: approver.map(str::to_string),
    }
}

fn business_cabin_policy() -> Policy {
    // Business cabin on short flights needs manager sign-off.
    policy(
        "business-cabin-short-haul",
        PolicyKind::SoftWarning,
        ConditionNode::Group {
            combinator: Combinator::And,
            children: vec![
                leaf(
                    "segments.cabin_class",
                    ComparisonOp::Equals,
                    FieldValue::Text("business".to_string()),
                ),
                leaf(
                    "segments.duration_minutes",
                    ComparisonOp::LessThan,
                    FieldValue::Int(360),
                ),
            ],
        },
        Some("manager"),
    )
}

fn directory() -> InMemoryEmployeeDirectory {
    InMemoryEmployeeDirectory::new(vec![
        DirectoryEntry {
            id: "u-alice".to_string(),
            role: "engineer".to_string(),
            role_rank: 0,
            active: true,
            manager_id: Some("u-mgr".to_string()),
        },
        DirectoryEntry {
            id: "u-mgr".to_string(),
            role: "manager".to_string(),
            role_rank: 1,
            active: true,
            manager_id: Some("u-vpf".to_string()),
        },
        DirectoryEntry {
            id: "u-vpf".to_string(),
            role: "vp_finance".to_string(),
            role_rank: 2,
            active: true,
            manager_id: Some("u-exec".to_string()),
        },
        DirectoryEntry {
            id: "u-exec".to_string(),
            role: "executive".to_string(),
            role_rank: 3,
            active: true,
            manager_id: None,
        },
    ])
}

#[test]
fn business_class_short_haul_warns_and_requires_approval() {
    let engine = EvaluationEngine::new(
        PolicyCatalog::new(vec![business_cabin_policy()]),
        EngineConfig::default(),
    );
    let context = trip(
        Decimal::new(1_800, 0),
        vec![flight("business", Decimal::new(1_500, 0), 180)],
    );

    let verdict = engine.evaluate_single(&org(), &context);

    assert_eq!(verdict.overall, PolicyOutcome::Warn);
    assert!(verdict.requires_approval);
    assert_eq!(verdict.required_approvers.len(), 1);
    assert_eq!(verdict.required_approvers[0].role, "manager");
    assert_eq!(
        verdict.results[0].details.get("field").map(String::as_str),
        Some("segments.cabin_class")
    );
}

#[test]
fn economy_long_haul_passes_the_same_policy() {
    let engine = EvaluationEngine::new(
        PolicyCatalog::new(vec![business_cabin_policy()]),
        EngineConfig::default(),
    );
    let context = trip(
        Decimal::new(900, 0),
        vec![flight("economy", Decimal::new(700, 0), 540)],
    );

    let verdict = engine.evaluate_single(&org(), &context);
    assert_eq!(verdict.overall, PolicyOutcome::Pass);
    assert!(!verdict.requires_approval);
}

#[test]
fn evaluation_is_deterministic_under_a_pinned_clock() {
    let engine = EvaluationEngine::new(
        PolicyCatalog::new(vec![
            business_cabin_policy(),
            policy(
                "trip-cost-cap",
                PolicyKind::HardStop,
                leaf(
                    "total_cost",
                    ComparisonOp::GreaterThan,
                    FieldValue::Decimal(Decimal::new(10_000, 0)),
                ),
                None,
            ),
        ]),
        EngineConfig::default(),
    );
    let context = trip(
        Decimal::new(12_000, 0),
        vec![flight("business", Decimal::new(9_000, 0), 200)],
    );
    let now = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).single().expect("valid timestamp");

    let first = engine.evaluate_single_at(&org(), &context, now);
    let second = engine.evaluate_single_at(&org(), &context, now);
    assert_eq!(first, second);
    assert_eq!(first.overall, PolicyOutcome::Stop);
}

#[test]
fn broken_policy_stops_while_neighbours_still_evaluate() {
    let engine = EvaluationEngine::new(
        PolicyCatalog::new(vec![
            policy(
                "typo-in-field",
                PolicyKind::SoftWarning,
                leaf("segments.cabni_class", ComparisonOp::Equals, FieldValue::Int(1)),
                None,
            ),
            business_cabin_policy(),
        ]),
        EngineConfig::default(),
    );
    let context = trip(
        Decimal::new(1_800, 0),
        vec![flight("business", Decimal::new(1_500, 0), 180)],
    );

    let verdict = engine.evaluate_single(&org(), &context);

    let broken = verdict
        .results
        .iter()
        .find(|result| result.policy_id == PolicyId("typo-in-field".to_string()))
        .expect("broken policy still yields a result");
    assert_eq!(broken.outcome, PolicyOutcome::Stop);
    assert_eq!(broken.details.get("flagged_by").map(String::as_str), Some("system"));

    let healthy = verdict
        .results
        .iter()
        .find(|result| result.policy_id == PolicyId("business-cabin-short-haul".to_string()))
        .expect("healthy policy evaluated");
    assert_eq!(healthy.outcome, PolicyOutcome::Warn);
}

#[test]
fn track_only_policies_never_raise_the_verdict_severity() {
    let engine = EvaluationEngine::new(
        PolicyCatalog::new(vec![policy(
            "international-travel-log",
            PolicyKind::TrackOnly,
            leaf("segment_count", ComparisonOp::GreaterOrEqual, FieldValue::Int(1)),
            None,
        )]),
        EngineConfig::default(),
    );
    let context = trip(Decimal::new(400, 0), vec![flight("economy", Decimal::new(400, 0), 90)]);

    let verdict = engine.evaluate_single(&org(), &context);
    assert_eq!(verdict.overall, PolicyOutcome::Pass);
    assert!(!verdict.requires_approval);
    assert_eq!(verdict.results.len(), 1);
    assert_eq!(
        verdict.results[0].details.get("tracked").map(String::as_str),
        Some("true")
    );
}

#[test]
fn bulk_verdicts_are_independent_and_ordered() {
    let engine = EvaluationEngine::new(
        PolicyCatalog::new(vec![business_cabin_policy()]),
        EngineConfig::default(),
    );
    let contexts = vec![
        trip(Decimal::new(1_800, 0), vec![flight("business", Decimal::new(1_500, 0), 180)]),
        trip(Decimal::new(700, 0), vec![flight("economy", Decimal::new(700, 0), 180)]),
        trip(Decimal::new(2_000, 0), vec![flight("business", Decimal::new(2_000, 0), 120)]),
    ];
    let now = Utc::now();

    let verdicts = engine.evaluate_bulk_at(&org(), &contexts, now);

    assert_eq!(verdicts.len(), 3);
    assert_eq!(verdicts[0].overall, PolicyOutcome::Warn);
    assert_eq!(verdicts[1].overall, PolicyOutcome::Pass);
    assert_eq!(verdicts[2].overall, PolicyOutcome::Warn);
    for (context, verdict) in contexts.iter().zip(&verdicts) {
        assert_eq!(*verdict, engine.evaluate_single_at(&org(), context, now));
    }
}

#[test]
fn expensive_trip_walks_the_full_ladder_in_order() {
    let config = EngineConfig::default();
    let engine = EvaluationEngine::new(
        PolicyCatalog::new(vec![business_cabin_policy()]),
        config.clone(),
    );
    let context = trip(
        Decimal::new(15_000, 0),
        vec![flight("business", Decimal::new(15_000, 0), 300)],
    );
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).single().expect("valid timestamp");

    let verdict = engine.evaluate_single_at(&org(), &context, now);
    assert!(verdict.requires_approval);

    let directory = directory();
    let builder = WorkflowBuilder::new(&directory, &config.approvals);
    let mut wf = builder
        .build(BookingId("bk-100".into()), &verdict, &context, now)
        .expect("routes")
        .workflow;

    let roles: Vec<&str> = wf.steps.iter().map(|step| step.role.as_str()).collect();
    assert_eq!(roles, vec!["manager", "vp_finance", "executive"]);

    let machine = WorkflowMachine::new(&config.approvals);
    for approver in ["u-mgr", "u-vpf", "u-exec"] {
        assert!(!wf.is_terminal());
        wf = machine
            .approve_step(&wf, approver, None, now + Duration::hours(1))
            .expect("chain approves in order")
            .workflow;
    }
    assert_eq!(wf.status, WorkflowStatus::Approved);
}

#[test]
fn mid_chain_rejection_closes_the_workflow() {
    let config = EngineConfig::default();
    let engine = EvaluationEngine::new(
        PolicyCatalog::new(vec![business_cabin_policy()]),
        config.clone(),
    );
    let context = trip(
        Decimal::new(15_000, 0),
        vec![flight("business", Decimal::new(15_000, 0), 300)],
    );
    let now = Utc::now();

    let verdict = engine.evaluate_single_at(&org(), &context, now);
    let directory = directory();
    let builder = WorkflowBuilder::new(&directory, &config.approvals);
    let machine = WorkflowMachine::new(&config.approvals);

    let wf = builder
        .build(BookingId("bk-101".into()), &verdict, &context, now)
        .expect("routes")
        .workflow;
    let wf = machine.approve_step(&wf, "u-mgr", None, now).expect("step 0").workflow;
    let wf = machine
        .reject_step(&wf, "u-vpf", "exceeds the quarterly travel budget", now)
        .expect("step 1 rejects")
        .workflow;

    assert_eq!(wf.status, WorkflowStatus::Rejected);
    assert_eq!(wf.steps[2].status, StepStatus::NotStarted);
    assert!(machine.approve_step(&wf, "u-exec", None, now).is_err());
}

#[test]
fn stalled_step_escalates_then_the_target_decides() {
    let config = EngineConfig::default();
    let engine = EvaluationEngine::new(
        PolicyCatalog::new(vec![business_cabin_policy()]),
        config.clone(),
    );
    let context = trip(
        Decimal::new(1_800, 0),
        vec![flight("business", Decimal::new(1_500, 0), 180)],
    );
    let created = Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).single().expect("valid timestamp");

    let verdict = engine.evaluate_single_at(&org(), &context, created);
    let directory = directory();
    let builder = WorkflowBuilder::new(&directory, &config.approvals);
    let machine = WorkflowMachine::new(&config.approvals);

    let wf = builder
        .build(BookingId("bk-102".into()), &verdict, &context, created)
        .expect("routes")
        .workflow;
    assert_eq!(wf.steps[0].approver_id, "u-mgr");

    let breach = wf.sla_deadline + Duration::hours(6);
    let escalated = machine.check_sla(&wf, breach).expect("escalates").workflow;
    assert_eq!(escalated.status, WorkflowStatus::Escalated);
    assert_eq!(escalated.steps[0].approver_id, "u-vpf");

    // The sweep re-running straight away changes nothing.
    let recheck = machine.check_sla(&escalated, breach).expect("idempotent");
    assert_eq!(recheck.workflow, escalated);

    let done = machine
        .approve_step(&escalated, "u-vpf", Some("covered by the offsite budget"), breach)
        .expect("target approves")
        .workflow;
    assert_eq!(done.status, WorkflowStatus::Approved);
}
