//! Resolves which humans sit on a booking's approval chain.
//!
//! Roles come from two sources: policies that name a required approver role,
//! and the cost-threshold ladder in the engine config. Role names are merged,
//! resolved against the employee directory, deduplicated, and ordered by rank
//! so the cheapest sign-off always goes first.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ApprovalConfig;
use crate::domain::context::TripContext;
use crate::domain::policy::normalize_key;
use crate::engine::Verdict;
use crate::errors::ValidationError;

use super::{
    ApprovalStep, ApprovalWorkflow, BookingId, StepStatus, WorkflowEvent, WorkflowId,
    WorkflowStatus, WorkflowTransition,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    pub role: String,
    pub role_rank: u8,
    pub active: bool,
    pub manager_id: Option<String>,
}

/// Lookup seam for the corporate directory. The in-memory implementation
/// backs tests and the CLI; deployments plug in their own HR feed.
pub trait EmployeeDirectory {
    fn lookup(&self, employee_id: &str) -> Option<&DirectoryEntry>;
    fn active_with_role(&self, role: &str) -> Vec<&DirectoryEntry>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryEmployeeDirectory {
    entries: Vec<DirectoryEntry>,
}

impl InMemoryEmployeeDirectory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self { entries }
    }
}

impl EmployeeDirectory for InMemoryEmployeeDirectory {
    fn lookup(&self, employee_id: &str) -> Option<&DirectoryEntry> {
        let key = normalize_key(employee_id);
        self.entries.iter().find(|entry| normalize_key(&entry.id) == key)
    }

    fn active_with_role(&self, role: &str) -> Vec<&DirectoryEntry> {
        let key = normalize_key(role);
        self.entries
            .iter()
            .filter(|entry| entry.active && normalize_key(&entry.role) == key)
            .collect()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("employee `{employee_id}` not found in the directory")]
    UnknownEmployee { employee_id: String },
    #[error("no active directory entry holds role `{role}`")]
    NoApproverForRole { role: String },
    #[error("reporting chain above `{employee_id}` exceeded {max_hops} hops without an active manager")]
    HierarchyBoundExceeded { employee_id: String, max_hops: u8 },
    #[error("reporting chain above `{employee_id}` loops back through `{via}`")]
    HierarchyCycle { employee_id: String, via: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Builds a fresh workflow from an evaluation verdict. Pure apart from the
/// generated workflow id; the same verdict and directory produce the same
/// chain.
pub struct WorkflowBuilder<'a, D> {
    directory: &'a D,
    config: &'a ApprovalConfig,
}

impl<'a, D> WorkflowBuilder<'a, D>
where
    D: EmployeeDirectory,
{
    pub fn new(directory: &'a D, config: &'a ApprovalConfig) -> Self {
        Self { directory, config }
    }

    pub fn build(
        &self,
        booking_id: BookingId,
        verdict: &Verdict,
        context: &TripContext,
        now: DateTime<Utc>,
    ) -> Result<WorkflowTransition, RoutingError> {
        if !verdict.requires_approval {
            return Err(ValidationError::ApprovalNotRequired { booking_id: booking_id.0 }.into());
        }

        let mut roles: Vec<String> =
            verdict.required_approvers.iter().map(|req| req.role.clone()).collect();
        for rung in &self.config.ladder {
            if context.total_cost >= rung.min_cost {
                roles.push(rung.role.clone());
            }
        }
        // A booking can need approval without any policy naming a role (e.g.
        // a soft warning below every ladder rung). Those route to the booker's
        // manager.
        if roles.is_empty() {
            roles.push("manager".to_string());
        }

        let booker = &context.employee.id;
        let mut approvers: Vec<(DirectoryEntry, String)> = Vec::new();
        let mut seen = HashSet::new();
        for role in roles {
            let entry = self.resolve_role(&role, booker)?;
            if seen.insert(normalize_key(&entry.id)) {
                approvers.push((entry, role));
            }
        }
        approvers.sort_by(|(a, _), (b, _)| a.role_rank.cmp(&b.role_rank).then(a.id.cmp(&b.id)));

        let escalation_target = self.resolve_role(&self.config.escalation_role, booker)?;
        let deadline = now + Duration::hours(self.config.sla_window_hours);

        let steps: Vec<ApprovalStep> = approvers
            .into_iter()
            .enumerate()
            .map(|(index, (entry, role))| ApprovalStep {
                index,
                approver_id: entry.id,
                role,
                status: if index == 0 { StepStatus::Pending } else { StepStatus::NotStarted },
                decided_at: None,
                justification: None,
                escalated: false,
                reassigned_from: None,
            })
            .collect();

        let workflow = ApprovalWorkflow {
            id: WorkflowId(format!("wf-{}", Uuid::new_v4())),
            booking_id,
            status: WorkflowStatus::Pending,
            current_step: 0,
            sla_deadline: deadline,
            escalation_target: escalation_target.id,
            created_at: now,
            resolved_at: None,
            steps,
        };

        let events = vec![WorkflowEvent::ApprovalRequested {
            workflow_id: workflow.id.clone(),
            step_index: 0,
            approver_id: workflow.steps[0].approver_id.clone(),
            deadline,
        }];

        Ok(WorkflowTransition { workflow, events })
    }

    fn resolve_role(&self, role: &str, booker_id: &str) -> Result<DirectoryEntry, RoutingError> {
        if normalize_key(role) == "manager" {
            return self.resolve_manager(booker_id);
        }

        self.directory
            .active_with_role(role)
            .into_iter()
            .min_by(|a, b| a.id.cmp(&b.id))
            .cloned()
            .ok_or_else(|| RoutingError::NoApproverForRole { role: role.to_string() })
    }

    /// Walks the reporting chain upward, skipping inactive managers, until an
    /// active one is found. The walk is bounded and cycle-checked because the
    /// directory feed is external input.
    fn resolve_manager(&self, employee_id: &str) -> Result<DirectoryEntry, RoutingError> {
        let start = self
            .directory
            .lookup(employee_id)
            .ok_or_else(|| RoutingError::UnknownEmployee { employee_id: employee_id.to_string() })?;

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(normalize_key(employee_id));
        let mut current = start.manager_id.clone();

        for _ in 0..self.config.hierarchy_hop_bound {
            let Some(manager_id) = current else {
                return Err(RoutingError::NoApproverForRole { role: "manager".to_string() });
            };
            if !visited.insert(normalize_key(&manager_id)) {
                return Err(RoutingError::HierarchyCycle {
                    employee_id: employee_id.to_string(),
                    via: manager_id,
                });
            }
            let entry = self.directory.lookup(&manager_id).ok_or_else(|| {
                RoutingError::UnknownEmployee { employee_id: manager_id.clone() }
            })?;
            if entry.active {
                return Ok(entry.clone());
            }
            current = entry.manager_id.clone();
        }

        Err(RoutingError::HierarchyBoundExceeded {
            employee_id: employee_id.to_string(),
            max_hops: self.config.hierarchy_hop_bound,
        })
    }
}
