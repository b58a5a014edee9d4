use std::process::ExitCode;

use waypoint_core::config::{ConfigOverrides, EngineConfig, LoadOptions};

fn init_logging(config: &EngineConfig) {
    use tracing::Level;
    use waypoint_core::config::LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

fn main() -> ExitCode {
    // Logging setup is best-effort; an unloadable config still reaches the
    // command layer, which reports the error as structured output.
    let overrides = ConfigOverrides::from_env().unwrap_or_default();
    let config = EngineConfig::load(LoadOptions { config_path: None, require_file: false, overrides })
        .unwrap_or_default();
    init_logging(&config);

    waypoint_cli::run()
}
