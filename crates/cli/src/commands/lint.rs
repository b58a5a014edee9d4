use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use waypoint_core::domain::policy::Policy;

use super::CommandResult;

/// Validates every rule tree in a policy file without touching any context.
/// Catches empty groups, NOT-arity mistakes, and operator/value shape
/// mismatches before the catalog ships.
pub fn run(policies_path: &Path) -> CommandResult {
    let raw = match fs::read_to_string(policies_path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "lint",
                "io",
                format!("could not read `{}`: {error}", policies_path.display()),
                2,
            );
        }
    };

    let policies: Vec<Policy> = match serde_json::from_str(&raw) {
        Ok(policies) => policies,
        Err(error) => {
            return CommandResult::failure(
                "lint",
                "policy_parse",
                format!("could not parse `{}`: {error}", policies_path.display()),
                2,
            );
        }
    };

    let findings: Vec<Value> = policies
        .iter()
        .filter_map(|policy| {
            policy.rule.validate().err().map(|error| {
                json!({
                    "policy_id": policy.id.0,
                    "version": policy.version,
                    "problem": error.to_string(),
                })
            })
        })
        .collect();

    if findings.is_empty() {
        return CommandResult::success(
            "lint",
            format!("{} policies checked, no problems found", policies.len()),
            None,
        );
    }

    let message = format!("{} of {} policies have invalid rules", findings.len(), policies.len());
    CommandResult::failure_with_data("lint", "invalid_rules", message, Value::Array(findings), 1)
}
