use std::collections::HashMap;

use crate::domain::context::TripContext;
use crate::domain::policy::{OrgId, Policy, PolicyId};

/// In-memory view of an organization's policies, collapsed to the latest
/// version of each. Superseded versions live only in the external audit store
/// and are never re-evaluated.
#[derive(Clone, Debug, Default)]
pub struct PolicyCatalog {
    policies: Vec<Policy>,
}

impl PolicyCatalog {
    pub fn new(policies: Vec<Policy>) -> Self {
        let mut latest: HashMap<(OrgId, PolicyId), Policy> = HashMap::new();
        for policy in policies {
            let key = (policy.org_id.clone(), policy.id.clone());
            match latest.get(&key) {
                Some(existing) if existing.version >= policy.version => {}
                _ => {
                    latest.insert(key, policy);
                }
            }
        }

        let mut policies: Vec<Policy> = latest.into_values().collect();
        policies.sort_by(|left, right| {
            left.priority.cmp(&right.priority).then_with(|| left.id.cmp(&right.id))
        });
        Self { policies }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Active policies applicable to this context, ordered by ascending
    /// priority with id tie-breaks. The ordering is stable and reproducible so
    /// first-violation reporting and test assertions are deterministic.
    pub fn resolve(&self, org_id: &OrgId, context: &TripContext) -> Vec<&Policy> {
        self.policies
            .iter()
            .filter(|policy| &policy.org_id == org_id && policy.applies_to(context))
            .collect()
    }
}
