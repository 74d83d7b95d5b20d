//! CLI command implementations.

pub mod cells;
pub mod identity;
pub mod run;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use wheelhouse_config::{WheelhouseConfig, load_config};
use wheelhouse_core::{BuildIdentity, Platform, TriggerContext, TriggerEnvNames};
use wheelhouse_executor::{GitReader, LocalProcessExecutor};

use crate::TriggerArgs;

/// Everything fixed before the first cell runs.
pub struct Resolved {
    pub config: WheelhouseConfig,
    pub workdir: PathBuf,
    pub trigger: TriggerContext,
    pub identity: BuildIdentity,
}

pub fn load(config_path: &Path) -> Result<WheelhouseConfig> {
    load_config(config_path)
        .with_context(|| format!("Failed to load config file: {}", config_path.display()))
}

/// Load the config, read the trigger and resolve the build identity.
/// Any failure here is fatal for the run.
pub async fn resolve(config_path: &Path, args: &TriggerArgs) -> Result<Resolved> {
    let config = load(config_path)?;

    let workdir = args
        .workdir
        .canonicalize()
        .with_context(|| format!("Failed to resolve workdir: {}", args.workdir.display()))?;

    let trigger = read_trigger(&config.trigger_env, args).context("Failed to read trigger")?;
    let classification = config.branches.classify(&trigger);

    let git = GitReader::new(Arc::new(LocalProcessExecutor::new()), &workdir)
        .with_count_ref(config.git.count_ref.clone())
        .context()
        .await
        .context("Failed to count commits")?;

    let identity = BuildIdentity::resolve_with(&config.branches, &trigger, &git);
    info!(
        trigger = %trigger,
        classification = ?classification,
        commits = git.main_commit_count,
        identity = %identity,
        "Resolved build identity"
    );

    Ok(Resolved {
        config,
        workdir,
        trigger,
        identity,
    })
}

/// Flags take precedence over the CI environment, one variable at a time.
pub fn read_trigger(names: &TriggerEnvNames, args: &TriggerArgs) -> Result<TriggerContext> {
    let lookup = |name: &str| {
        let flag = if name == names.branch {
            args.branch.clone()
        } else if name == names.pull_request_number {
            args.pr_number.map(|n| n.to_string())
        } else if name == names.pull_request_source_branch {
            args.pr_source_branch.clone()
        } else {
            None
        };
        flag.or_else(|| std::env::var(name).ok())
    };
    Ok(TriggerContext::from_lookup(names, lookup)?)
}

pub fn platform(requested: Option<&str>) -> Result<Platform> {
    match requested {
        Some(name) => Ok(name.parse::<Platform>()?),
        None => Platform::current()
            .with_context(|| format!("Unsupported platform: {}", std::env::consts::OS)),
    }
}

pub fn validate(path: &Path) -> bool {
    match load(path) {
        Ok(config) => {
            println!("Configuration is valid");
            println!("  package: {}", config.package);
            let versions: Vec<String> = config
                .interpreters
                .iter()
                .map(|e| e.version.to_string())
                .collect();
            println!("  python: {}", versions.join(", "));
            println!("  max failures: {}", config.test.policy.max_failures);
            true
        }
        Err(e) => {
            println!("Configuration error: {:#}", e);
            false
        }
    }
}
