pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "waypoint",
    about = "Waypoint policy engine CLI",
    long_about = "Evaluate trip contexts against a policy catalog, lint policy files, and inspect effective configuration.",
    after_help = "Examples:\n  waypoint evaluate --policies policies.json --context trip.json --org acme\n  waypoint lint --policies policies.json\n  waypoint config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Evaluate one trip context (or an array of them) against a policy catalog")]
    Evaluate {
        #[arg(long, help = "Path to a JSON file holding the policy catalog")]
        policies: PathBuf,
        #[arg(long, help = "Path to a JSON trip context, or an array for bulk evaluation")]
        context: PathBuf,
        #[arg(long, help = "Organization the policies are evaluated for")]
        org: String,
        #[arg(long, help = "Optional engine config file (TOML)")]
        config: Option<PathBuf>,
    },
    #[command(about = "Validate every rule tree in a policy file without evaluating anything")]
    Lint {
        #[arg(long, help = "Path to a JSON file holding the policy catalog")]
        policies: PathBuf,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config {
        #[arg(long, help = "Optional engine config file (TOML)")]
        config: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Evaluate { policies, context, org, config } => {
            commands::evaluate::run(&policies, &context, &org, config.as_deref())
        }
        Command::Lint { policies } => commands::lint::run(&policies),
        Command::Config { config } => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(config.as_deref()) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
