use std::env;
use std::fs;
use std::path::Path;

use toml::Value;
use waypoint_core::config::{ConfigOverrides, EngineConfig, LoadOptions};

pub fn run(config_path: Option<&Path>) -> String {
    let overrides = match ConfigOverrides::from_env() {
        Ok(overrides) => overrides,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let resolved_path = config_path.map(Path::to_path_buf).or_else(EngineConfig::detect_config_path);
    let config = match EngineConfig::load(LoadOptions {
        config_path: resolved_path.clone(),
        require_file: config_path.is_some(),
        overrides,
    }) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_doc = load_config_file_doc(resolved_path.as_deref());
    let doc = config_file_doc.as_ref();
    let file = resolved_path.as_deref();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "approval_mode",
        &format!("{:?}", config.approval_mode),
        field_source("approval_mode", Some("WAYPOINT_APPROVAL_MODE"), doc, file),
    ));
    lines.push(render_line(
        "approvals.sla_window_hours",
        &config.approvals.sla_window_hours.to_string(),
        field_source("approvals.sla_window_hours", Some("WAYPOINT_SLA_WINDOW_HOURS"), doc, file),
    ));
    lines.push(render_line(
        "approvals.hierarchy_hop_bound",
        &config.approvals.hierarchy_hop_bound.to_string(),
        field_source(
            "approvals.hierarchy_hop_bound",
            Some("WAYPOINT_HIERARCHY_HOP_BOUND"),
            doc,
            file,
        ),
    ));
    lines.push(render_line(
        "approvals.escalation_role",
        &config.approvals.escalation_role,
        field_source("approvals.escalation_role", Some("WAYPOINT_ESCALATION_ROLE"), doc, file),
    ));

    let ladder: Vec<String> = config
        .approvals
        .ladder
        .iter()
        .map(|rung| format!("{} >= {}", rung.role, rung.min_cost))
        .collect();
    lines.push(render_line(
        "approvals.ladder",
        &ladder.join(", "),
        field_source("approvals.ladder", None, doc, file),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        field_source("logging.level", Some("WAYPOINT_LOG_LEVEL"), doc, file),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        field_source("logging.format", None, doc, file),
    ));

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
