pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod resolver;
pub mod rules;

pub use approvals::routing::{
    DirectoryEntry, EmployeeDirectory, InMemoryEmployeeDirectory, RoutingError, WorkflowBuilder,
};
pub use approvals::{
    ApprovalStep, ApprovalWorkflow, BookingId, StepStatus, WorkflowError, WorkflowEvent,
    WorkflowId, WorkflowMachine, WorkflowStatus, WorkflowTransition,
};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{ApprovalConfig, ApprovalMode, ConfigError, CostRung, EngineConfig, LoadOptions};
pub use domain::context::{EmployeeProfile, FieldValue, TripContext, TripSegment};
pub use domain::policy::{OrgId, Policy, PolicyId, PolicyKind, PolicyScope};
pub use engine::{
    ApproverRequirement, EvaluationEngine, PolicyEvaluation, PolicyOutcome, Verdict,
};
pub use errors::{EvaluationError, ValidationError};
pub use resolver::PolicyCatalog;
pub use rules::{Combinator, ComparisonOp, ConditionNode, LeafTrace, RuleMatch};
