use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Effective engine configuration: approval mode, SLA/escalation tuning, the
/// cost-threshold approver ladder, and logging for the surrounding binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub approval_mode: ApprovalMode,
    pub approvals: ApprovalConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalConfig {
    pub sla_window_hours: i64,
    pub hierarchy_hop_bound: u8,
    pub escalation_role: String,
    pub ladder: Vec<CostRung>,
}

/// One rung of the cost-threshold approver ladder: bookings at or above
/// `min_cost` require sign-off from `role`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRung {
    pub min_cost: Decimal,
    pub role: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Whether every booking routes to an approver or only those with findings.
/// Recovered from the travel platform's organization-level approval modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    AlwaysAsk,
    #[default]
    OnlyWhenNecessary,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub approval_mode: Option<ApprovalMode>,
    pub sla_window_hours: Option<i64>,
    pub hierarchy_hop_bound: Option<u8>,
    pub escalation_role: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_mode: ApprovalMode::OnlyWhenNecessary,
            approvals: ApprovalConfig {
                sla_window_hours: 48,
                hierarchy_hop_bound: 5,
                escalation_role: "vp_finance".to_string(),
                ladder: vec![
                    CostRung { min_cost: Decimal::new(500_000, 2), role: "manager".to_string() },
                    CostRung {
                        min_cost: Decimal::new(1_000_000, 2),
                        role: "vp_finance".to_string(),
                    },
                    CostRung {
                        min_cost: Decimal::new(1_500_000, 2),
                        role: "executive".to_string(),
                    },
                ],
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for ApprovalMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always_ask" => Ok(Self::AlwaysAsk),
            "only_when_necessary" => Ok(Self::OnlyWhenNecessary),
            other => Err(ConfigError::Validation(format!(
                "unsupported approval mode `{other}` (expected always_ask|only_when_necessary)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    approval_mode: Option<String>,
    #[serde(default)]
    approvals: FileApprovals,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Debug, Default, Deserialize)]
struct FileApprovals {
    sla_window_hours: Option<i64>,
    hierarchy_hop_bound: Option<u8>,
    escalation_role: Option<String>,
    ladder: Option<Vec<FileRung>>,
}

#[derive(Debug, Deserialize)]
struct FileRung {
    min_cost: String,
    role: String,
}

#[derive(Debug, Default, Deserialize)]
struct FileLogging {
    level: Option<String>,
    format: Option<String>,
}

impl ConfigOverrides {
    /// Reads `WAYPOINT_*` environment overrides. Unset variables leave the
    /// file/default values in place; malformed ones fail loudly.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut overrides = Self::default();

        if let Ok(value) = env::var("WAYPOINT_APPROVAL_MODE") {
            overrides.approval_mode = Some(value.parse()?);
        }
        if let Ok(value) = env::var("WAYPOINT_SLA_WINDOW_HOURS") {
            overrides.sla_window_hours = Some(value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "WAYPOINT_SLA_WINDOW_HOURS".to_string(),
                    value,
                }
            })?);
        }
        if let Ok(value) = env::var("WAYPOINT_HIERARCHY_HOP_BOUND") {
            overrides.hierarchy_hop_bound = Some(value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "WAYPOINT_HIERARCHY_HOP_BOUND".to_string(),
                    value,
                }
            })?);
        }
        if let Ok(value) = env::var("WAYPOINT_ESCALATION_ROLE") {
            overrides.escalation_role = Some(value);
        }
        if let Ok(value) = env::var("WAYPOINT_LOG_LEVEL") {
            overrides.log_level = Some(value);
        }

        Ok(overrides)
    }
}

impl EngineConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = options.config_path.clone().or_else(Self::detect_config_path);
        if let Some(path) = &path {
            match fs::read_to_string(path) {
                Ok(raw) => {
                    let file: FileConfig = toml::from_str(&raw)
                        .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?;
                    config.apply_file(file)?;
                }
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                    if options.require_file {
                        return Err(ConfigError::MissingConfigFile(path.clone()));
                    }
                }
                Err(source) => {
                    return Err(ConfigError::ReadFile { path: path.clone(), source });
                }
            }
        }

        config.apply_overrides(&options.overrides);
        config.validate()?;
        Ok(config)
    }

    /// Default config file locations, checked when `LoadOptions` carries no
    /// explicit path: `waypoint.toml` in the working directory, then
    /// `config/waypoint.toml`.
    pub fn detect_config_path() -> Option<PathBuf> {
        detect_config_path_in(Path::new("."))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw)
            .map_err(|source| ConfigError::ParseFile { path: PathBuf::from("<inline>"), source })?;
        let mut config = Self::default();
        config.apply_file(file)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(mode) = file.approval_mode {
            self.approval_mode = mode.parse()?;
        }
        if let Some(hours) = file.approvals.sla_window_hours {
            self.approvals.sla_window_hours = hours;
        }
        if let Some(bound) = file.approvals.hierarchy_hop_bound {
            self.approvals.hierarchy_hop_bound = bound;
        }
        if let Some(role) = file.approvals.escalation_role {
            self.approvals.escalation_role = role;
        }
        if let Some(rungs) = file.approvals.ladder {
            let mut ladder = Vec::with_capacity(rungs.len());
            for rung in rungs {
                let min_cost = Decimal::from_str(rung.min_cost.trim()).map_err(|_| {
                    ConfigError::Validation(format!(
                        "ladder rung for `{}` has unparseable min_cost `{}`",
                        rung.role, rung.min_cost
                    ))
                })?;
                ladder.push(CostRung { min_cost, role: rung.role });
            }
            self.approvals.ladder = ladder;
        }
        if let Some(level) = file.logging.level {
            self.logging.level = level;
        }
        if let Some(format) = file.logging.format {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(mode) = overrides.approval_mode {
            self.approval_mode = mode;
        }
        if let Some(hours) = overrides.sla_window_hours {
            self.approvals.sla_window_hours = hours;
        }
        if let Some(bound) = overrides.hierarchy_hop_bound {
            self.approvals.hierarchy_hop_bound = bound;
        }
        if let Some(role) = &overrides.escalation_role {
            self.approvals.escalation_role = role.clone();
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.approvals.sla_window_hours <= 0 {
            return Err(ConfigError::Validation("sla_window_hours must be positive".to_string()));
        }
        if self.approvals.hierarchy_hop_bound == 0 {
            return Err(ConfigError::Validation(
                "hierarchy_hop_bound must be at least 1".to_string(),
            ));
        }
        if self.approvals.escalation_role.trim().is_empty() {
            return Err(ConfigError::Validation("escalation_role must not be empty".to_string()));
        }

        let mut previous: Option<Decimal> = None;
        for rung in &self.approvals.ladder {
            if rung.role.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "ladder rung roles must not be empty".to_string(),
                ));
            }
            if let Some(previous) = previous {
                if rung.min_cost <= previous {
                    return Err(ConfigError::Validation(format!(
                        "ladder thresholds must be strictly increasing; `{}` at {} does not exceed {}",
                        rung.role, rung.min_cost, previous
                    )));
                }
            }
            previous = Some(rung.min_cost);
        }

        Ok(())
    }
}

fn detect_config_path_in(root: &Path) -> Option<PathBuf> {
    let direct = root.join("waypoint.toml");
    if direct.exists() {
        return Some(direct);
    }

    let nested = root.join("config").join("waypoint.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}
