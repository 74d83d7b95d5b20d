//! wheelhouse CLI tool.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "wheelhouse")]
#[command(about = "Build identity resolution and build-test matrix driver", long_about = None)]
struct Cli {
    /// Path to the matrix configuration
    #[arg(
        long,
        global = true,
        env = "WHEELHOUSE_CONFIG",
        default_value = "wheelhouse.kdl"
    )]
    config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Trigger overrides. Anything not given is read from the CI environment.
#[derive(Args, Clone, Default)]
pub struct TriggerArgs {
    /// Repository checkout to build in
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Branch that triggered the run
    #[arg(long)]
    pub branch: Option<String>,

    /// Pull request number
    #[arg(long)]
    pub pr_number: Option<u64>,

    /// Source branch of the pull request
    #[arg(long)]
    pub pr_source_branch: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and print the build identity
    Identity {
        #[command(flatten)]
        trigger: TriggerArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "shell")]
        format: commands::identity::IdentityFormat,
    },
    /// List the matrix cells for this platform
    Cells {
        #[command(flatten)]
        trigger: TriggerArgs,

        /// Platform to enumerate (defaults to the current one)
        #[arg(long)]
        platform: Option<String>,
    },
    /// Build and test every eligible cell
    Run {
        #[command(flatten)]
        trigger: TriggerArgs,

        /// Platform to run (defaults to the current one)
        #[arg(long)]
        platform: Option<String>,

        /// Only run these interpreter versions
        #[arg(long = "python", value_name = "VERSION")]
        python: Vec<String>,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Validate a matrix configuration
    Validate {
        /// Path to the configuration file (defaults to --config)
        path: Option<PathBuf>,
    },
}

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let ok = match cli.command {
        Commands::Identity { trigger, format } => {
            commands::identity::run(&cli.config, &trigger, format).await?;
            true
        }
        Commands::Cells { trigger, platform } => {
            commands::cells::run(&cli.config, &trigger, platform.as_deref()).await?;
            true
        }
        Commands::Run {
            trigger,
            platform,
            python,
            json,
        } => {
            let options = commands::run::RunOptions {
                platform,
                python,
                json,
            };
            commands::run::run(&cli.config, &trigger, options).await?
        }
        Commands::Validate { path } => commands::validate(path.as_ref().unwrap_or(&cli.config)),
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
