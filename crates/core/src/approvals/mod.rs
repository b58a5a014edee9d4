pub mod routing;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::config::ApprovalConfig;
use crate::domain::policy::normalize_key;
use crate::errors::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Escalated,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    NotStarted,
    Pending,
    Approved,
    Rejected,
}

/// One link in the ordered approval chain. The approver identity is resolved
/// once at workflow creation and only changes through SLA escalation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub index: usize,
    pub approver_id: String,
    pub role: String,
    pub status: StepStatus,
    pub decided_at: Option<DateTime<Utc>>,
    pub justification: Option<String>,
    pub escalated: bool,
    pub reassigned_from: Option<String>,
}

/// Persisted state machine driving a booking through its approval chain.
/// Transitions return fresh snapshots; the caller serializes concurrent
/// decisions and sweeps per workflow (CAS or row lock) before applying them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    pub id: WorkflowId,
    pub booking_id: BookingId,
    pub status: WorkflowStatus,
    pub steps: Vec<ApprovalStep>,
    pub current_step: usize,
    pub sla_deadline: DateTime<Utc>,
    pub escalation_target: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ApprovalWorkflow {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Side effects for the external notification component. The state machine
/// never dispatches anything itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    ApprovalRequested {
        workflow_id: WorkflowId,
        step_index: usize,
        approver_id: String,
        deadline: DateTime<Utc>,
    },
    ApprovalEscalated {
        workflow_id: WorkflowId,
        step_index: usize,
        new_approver_id: String,
        deadline: DateTime<Utc>,
    },
    WorkflowResolved {
        workflow_id: WorkflowId,
        outcome: WorkflowStatus,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowTransition {
    pub workflow: ApprovalWorkflow,
    pub events: Vec<WorkflowEvent>,
}

impl WorkflowTransition {
    fn unchanged(workflow: ApprovalWorkflow) -> Self {
        Self { workflow, events: Vec::new() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(
        "`{approver_id}` is not the required approver for step {step_index} of workflow `{workflow_id}` (expected `{required_approver}`)"
    )]
    Unauthorized {
        workflow_id: WorkflowId,
        step_index: usize,
        approver_id: String,
        required_approver: String,
    },
    #[error("workflow `{workflow_id}` is already resolved as {status:?}")]
    AlreadyResolved { workflow_id: WorkflowId, status: WorkflowStatus },
    #[error("step {step_index} of workflow `{workflow_id}` is not awaiting a decision")]
    StepNotActionable { workflow_id: WorkflowId, step_index: usize },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("configuration fault on workflow `{workflow_id}` step {step_index}: {detail}")]
    Configuration { workflow_id: WorkflowId, step_index: usize, detail: String },
}

/// Applies decisions and SLA sweeps to workflow snapshots.
#[derive(Clone, Debug)]
pub struct WorkflowMachine {
    sla_window: Duration,
}

impl WorkflowMachine {
    pub fn new(config: &ApprovalConfig) -> Self {
        Self { sla_window: Duration::hours(config.sla_window_hours) }
    }

    pub fn approve_step(
        &self,
        workflow: &ApprovalWorkflow,
        approver_id: &str,
        justification: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WorkflowTransition, WorkflowError> {
        let mut workflow = workflow.clone();
        let index = self.actionable_step(&workflow, approver_id)?;

        let step = &mut workflow.steps[index];
        step.status = StepStatus::Approved;
        step.decided_at = Some(now);
        step.justification =
            justification.map(str::trim).filter(|text| !text.is_empty()).map(str::to_string);

        let mut events = Vec::new();
        if index + 1 == workflow.steps.len() {
            workflow.status = WorkflowStatus::Approved;
            workflow.resolved_at = Some(now);
            events.push(WorkflowEvent::WorkflowResolved {
                workflow_id: workflow.id.clone(),
                outcome: WorkflowStatus::Approved,
            });
        } else {
            workflow.current_step = index + 1;
            workflow.steps[index + 1].status = StepStatus::Pending;
            workflow.status = WorkflowStatus::InProgress;
            workflow.sla_deadline = now + self.sla_window;
            events.push(WorkflowEvent::ApprovalRequested {
                workflow_id: workflow.id.clone(),
                step_index: index + 1,
                approver_id: workflow.steps[index + 1].approver_id.clone(),
                deadline: workflow.sla_deadline,
            });
        }

        Ok(WorkflowTransition { workflow, events })
    }

    pub fn reject_step(
        &self,
        workflow: &ApprovalWorkflow,
        approver_id: &str,
        justification: &str,
        now: DateTime<Utc>,
    ) -> Result<WorkflowTransition, WorkflowError> {
        if justification.trim().is_empty() {
            return Err(ValidationError::MissingJustification.into());
        }

        let mut workflow = workflow.clone();
        let index = self.actionable_step(&workflow, approver_id)?;

        let step = &mut workflow.steps[index];
        step.status = StepStatus::Rejected;
        step.decided_at = Some(now);
        step.justification = Some(justification.trim().to_string());

        workflow.status = WorkflowStatus::Rejected;
        workflow.resolved_at = Some(now);

        Ok(WorkflowTransition {
            events: vec![WorkflowEvent::WorkflowResolved {
                workflow_id: workflow.id.clone(),
                outcome: WorkflowStatus::Rejected,
            }],
            workflow,
        })
    }

    /// Periodic sweep, driven externally. Idempotent: a workflow whose
    /// deadline is in the future (or which is terminal) passes through
    /// untouched, so re-invocation after a storage retry is safe.
    pub fn check_sla(
        &self,
        workflow: &ApprovalWorkflow,
        now: DateTime<Utc>,
    ) -> Result<WorkflowTransition, WorkflowError> {
        if workflow.is_terminal() || now <= workflow.sla_deadline {
            return Ok(WorkflowTransition::unchanged(workflow.clone()));
        }

        let mut workflow = workflow.clone();
        let index = workflow.current_step;
        if workflow.steps[index].escalated {
            return Err(WorkflowError::Configuration {
                workflow_id: workflow.id.clone(),
                step_index: index,
                detail: "SLA breached again after escalation; operator intervention required"
                    .to_string(),
            });
        }

        let step = &mut workflow.steps[index];
        step.reassigned_from = Some(step.approver_id.clone());
        step.approver_id = workflow.escalation_target.clone();
        step.escalated = true;

        workflow.status = WorkflowStatus::Escalated;
        workflow.sla_deadline = now + self.sla_window;

        Ok(WorkflowTransition {
            events: vec![WorkflowEvent::ApprovalEscalated {
                workflow_id: workflow.id.clone(),
                step_index: index,
                new_approver_id: workflow.escalation_target.clone(),
                deadline: workflow.sla_deadline,
            }],
            workflow,
        })
    }

    /// Terminalizes a workflow whose booking was canceled, so no orphaned
    /// PENDING workflows accumulate.
    pub fn abandon(
        &self,
        workflow: &ApprovalWorkflow,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<WorkflowTransition, WorkflowError> {
        if workflow.is_terminal() {
            return Err(WorkflowError::AlreadyResolved {
                workflow_id: workflow.id.clone(),
                status: workflow.status,
            });
        }

        let mut workflow = workflow.clone();
        let index = workflow.current_step;
        let step = &mut workflow.steps[index];
        step.status = StepStatus::Rejected;
        step.decided_at = Some(now);
        step.justification = Some(format!("abandoned by caller: {}", reason.trim()));

        workflow.status = WorkflowStatus::Rejected;
        workflow.resolved_at = Some(now);

        Ok(WorkflowTransition {
            events: vec![WorkflowEvent::WorkflowResolved {
                workflow_id: workflow.id.clone(),
                outcome: WorkflowStatus::Rejected,
            }],
            workflow,
        })
    }

    pub fn approve_step_with_audit<S>(
        &self,
        workflow: &ApprovalWorkflow,
        approver_id: &str,
        justification: Option<&str>,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<WorkflowTransition, WorkflowError>
    where
        S: AuditSink,
    {
        let result = self.approve_step(workflow, approver_id, justification, now);
        emit_transition_audit(&result, "workflow.step_approved", sink, audit);
        result
    }

    pub fn reject_step_with_audit<S>(
        &self,
        workflow: &ApprovalWorkflow,
        approver_id: &str,
        justification: &str,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<WorkflowTransition, WorkflowError>
    where
        S: AuditSink,
    {
        let result = self.reject_step(workflow, approver_id, justification, now);
        emit_transition_audit(&result, "workflow.step_rejected", sink, audit);
        result
    }

    pub fn check_sla_with_audit<S>(
        &self,
        workflow: &ApprovalWorkflow,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<WorkflowTransition, WorkflowError>
    where
        S: AuditSink,
    {
        let result = self.check_sla(workflow, now);
        emit_transition_audit(&result, "workflow.sla_checked", sink, audit);
        result
    }

    /// Authorization and state checks shared by decisions. No mutation happens
    /// until both pass.
    fn actionable_step(
        &self,
        workflow: &ApprovalWorkflow,
        approver_id: &str,
    ) -> Result<usize, WorkflowError> {
        if workflow.is_terminal() {
            return Err(WorkflowError::AlreadyResolved {
                workflow_id: workflow.id.clone(),
                status: workflow.status,
            });
        }

        let index = workflow.current_step;
        let step = &workflow.steps[index];
        if step.status != StepStatus::Pending {
            return Err(WorkflowError::StepNotActionable {
                workflow_id: workflow.id.clone(),
                step_index: index,
            });
        }
        if normalize_key(&step.approver_id) != normalize_key(approver_id) {
            return Err(WorkflowError::Unauthorized {
                workflow_id: workflow.id.clone(),
                step_index: index,
                approver_id: approver_id.to_string(),
                required_approver: step.approver_id.clone(),
            });
        }

        Ok(index)
    }
}

fn emit_transition_audit<S>(
    result: &Result<WorkflowTransition, WorkflowError>,
    event_type: &str,
    sink: &S,
    audit: &AuditContext,
) where
    S: AuditSink,
{
    match result {
        Ok(transition) => {
            sink.emit(
                AuditEvent::new(
                    audit.booking_id.clone(),
                    audit.correlation_id.clone(),
                    event_type,
                    AuditCategory::Workflow,
                    audit.actor.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("workflow_id", transition.workflow.id.to_string())
                .with_metadata("status", format!("{:?}", transition.workflow.status))
                .with_metadata("current_step", transition.workflow.current_step.to_string()),
            );
        }
        Err(error) => {
            // Configuration faults are filed as system failures, not caller rejections.
            let (rejected_event, category, outcome) = match error {
                WorkflowError::Configuration { .. } => {
                    ("workflow.configuration_fault", AuditCategory::System, AuditOutcome::Failed)
                }
                _ => ("workflow.transition_rejected", AuditCategory::Workflow, AuditOutcome::Rejected),
            };
            sink.emit(
                AuditEvent::new(
                    audit.booking_id.clone(),
                    audit.correlation_id.clone(),
                    rejected_event,
                    category,
                    audit.actor.clone(),
                    outcome,
                )
                .with_metadata("attempted", event_type)
                .with_metadata("error", error.to_string()),
            );
        }
    }
}
