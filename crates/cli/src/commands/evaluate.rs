use std::fs;
use std::path::Path;

use serde_json::Value;
use waypoint_core::config::{ConfigOverrides, EngineConfig, LoadOptions};
use waypoint_core::domain::context::TripContext;
use waypoint_core::domain::policy::{OrgId, Policy};
use waypoint_core::engine::{EvaluationEngine, PolicyOutcome, Verdict};
use waypoint_core::resolver::PolicyCatalog;

use super::CommandResult;

pub fn run(
    policies_path: &Path,
    context_path: &Path,
    org: &str,
    config_path: Option<&Path>,
) -> CommandResult {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let policies: Vec<Policy> = match read_json(policies_path, "policy_parse") {
        Ok(policies) => policies,
        Err(result) => return result,
    };
    let policy_count = policies.len();

    let contexts = match read_contexts(context_path) {
        Ok(contexts) => contexts,
        Err(result) => return result,
    };

    let engine = EvaluationEngine::new(PolicyCatalog::new(policies), config);
    let org = OrgId(org.to_string());

    let (verdicts, data) = match &contexts {
        Contexts::Single(context) => {
            let verdict = engine.evaluate_single(&org, context);
            let data = serde_json::to_value(&verdict).unwrap_or(Value::Null);
            (vec![verdict], data)
        }
        Contexts::Bulk(contexts) => {
            let verdicts = engine.evaluate_bulk(&org, contexts);
            let data = serde_json::to_value(&verdicts).unwrap_or(Value::Null);
            (verdicts, data)
        }
    };

    tracing::info!(
        org = %org.0,
        policies = policy_count,
        contexts = verdicts.len(),
        "evaluation complete"
    );

    let stops = verdicts.iter().filter(|verdict| verdict.overall == PolicyOutcome::Stop).count();
    let message = summarize(&verdicts, stops);
    let result = CommandResult::success("evaluate", message, Some(data));
    if stops > 0 {
        result.with_exit_code(1)
    } else {
        result
    }
}

enum Contexts {
    Single(Box<TripContext>),
    Bulk(Vec<TripContext>),
}

fn load_config(config_path: Option<&Path>) -> Result<EngineConfig, CommandResult> {
    let overrides = ConfigOverrides::from_env().map_err(|error| {
        CommandResult::failure("evaluate", "config_validation", error.to_string(), 2)
    })?;
    let options = LoadOptions {
        config_path: config_path.map(Path::to_path_buf),
        require_file: config_path.is_some(),
        overrides,
    };
    EngineConfig::load(options).map_err(|error| {
        CommandResult::failure("evaluate", "config_validation", error.to_string(), 2)
    })
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
    error_class: &str,
) -> Result<T, CommandResult> {
    let raw = fs::read_to_string(path).map_err(|error| {
        CommandResult::failure(
            "evaluate",
            "io",
            format!("could not read `{}`: {error}", path.display()),
            2,
        )
    })?;
    serde_json::from_str(&raw).map_err(|error| {
        CommandResult::failure(
            "evaluate",
            error_class,
            format!("could not parse `{}`: {error}", path.display()),
            2,
        )
    })
}

/// A context file holds either one trip or an array of candidate trips.
fn read_contexts(path: &Path) -> Result<Contexts, CommandResult> {
    let raw: Value = read_json(path, "context_parse")?;
    if raw.is_array() {
        serde_json::from_value(raw).map(Contexts::Bulk)
    } else {
        serde_json::from_value(raw).map(|context| Contexts::Single(Box::new(context)))
    }
    .map_err(|error| {
        CommandResult::failure(
            "evaluate",
            "context_parse",
            format!("could not parse `{}`: {error}", path.display()),
            2,
        )
    })
}

fn summarize(verdicts: &[Verdict], stops: usize) -> String {
    let warns =
        verdicts.iter().filter(|verdict| verdict.overall == PolicyOutcome::Warn).count();
    let approvals = verdicts.iter().filter(|verdict| verdict.requires_approval).count();
    format!(
        "evaluated {} context(s): {} stop, {} warn, {} requiring approval",
        verdicts.len(),
        stops,
        warns,
        approvals
    )
}
