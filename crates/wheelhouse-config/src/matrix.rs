//! Matrix configuration parsing.
//!
//! ```kdl
//! package "datatable"
//! version "1.1.0"
//! dist-dir "dist"
//!
//! vars {
//!     extras "[test]"
//! }
//!
//! python "3.6" when="release"
//! python "3.8"
//! python "3.10" platforms="linux" platforms="macos"
//!
//! branches {
//!     main "main"
//!     release-prefix "rel-"
//! }
//!
//! build {
//!     run "python${cell.python}" "ci/ext.py" "wheel"
//! }
//!
//! install {
//!     run "python${cell.python}" "-m" "pip" "install"
//!     with "pytest" "docutils"
//! }
//!
//! test {
//!     run "python${cell.python}" "-m" "pytest"
//!     args "tests"
//!     max-failures 10
//! }
//! ```

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use wheelhouse_core::{
    BranchPolicy, Eligibility, IdentityEnvNames, InterpreterEntry, Platform, PythonVersion,
    TestPolicy, TriggerEnvNames,
};

/// Static configuration of the build matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelhouseConfig {
    /// Package name as it appears in artifact names.
    pub package: String,
    /// Base version stamped with the build identity (`${identity.version}`).
    pub base_version: Option<String>,
    /// Directory the build tool writes artifacts into, relative to the workdir.
    pub dist_dir: String,
    /// Artifact file extension.
    pub artifact_ext: String,
    /// Interpreter versions in execution order.
    pub interpreters: Vec<InterpreterEntry>,
    pub branches: BranchPolicy,
    pub trigger_env: TriggerEnvNames,
    pub identity_env: IdentityEnvNames,
    pub git: GitSettings,
    pub build: StepConfig,
    pub install: InstallConfig,
    pub test: TestConfig,
    /// User variables available to commands as `${name}`.
    pub vars: BTreeMap<String, String>,
}

/// How the commit count is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSettings {
    /// Ref whose reachable commits are counted.
    pub count_ref: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            count_ref: "HEAD".to_string(),
        }
    }
}

/// A command run for each cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepConfig {
    /// Command line; the first element is the program.
    pub command: Vec<String>,
    /// Step-specific environment variables.
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallConfig {
    pub step: StepConfig,
    /// Auxiliary dependencies installed together with the artifact.
    pub with: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestConfig {
    pub step: StepConfig,
    /// Arguments appended after the policy flags (test paths, markers).
    pub args: Vec<String>,
    pub policy: TestPolicy,
}

/// Read and parse a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<WheelhouseConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse a matrix configuration from KDL text.
pub fn parse_config(kdl: &str) -> ConfigResult<WheelhouseConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut package = String::new();
    let mut base_version = None;
    let mut dist_dir = "dist".to_string();
    let mut artifact_ext = "whl".to_string();
    let mut interpreters: Vec<InterpreterEntry> = Vec::new();
    let mut branches = BranchPolicy::default();
    let mut trigger_env = TriggerEnvNames::default();
    let mut identity_env = IdentityEnvNames::default();
    let mut git = GitSettings::default();
    let mut build = None;
    let mut install = None;
    let mut test = None;
    let mut vars = BTreeMap::new();

    for node in doc.nodes() {
        match node.name().value() {
            "package" => {
                package = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("package name".to_string()))?;
            }
            "version" => base_version = get_first_string_arg(node),
            "dist-dir" => {
                if let Some(dir) = get_first_string_arg(node) {
                    dist_dir = dir;
                }
            }
            "artifact-ext" => {
                if let Some(ext) = get_first_string_arg(node) {
                    artifact_ext = ext.trim_start_matches('.').to_string();
                }
            }
            "python" => {
                let entry = parse_python(node)?;
                if interpreters.iter().any(|e| e.version == entry.version) {
                    return Err(ConfigError::Duplicate(format!("python {}", entry.version)));
                }
                interpreters.push(entry);
            }
            "branches" => branches = parse_branches(node)?,
            "trigger" => {
                for (key, value) in child_strings(node) {
                    match key.as_str() {
                        "branch" => trigger_env.branch = value,
                        "pr-number" => trigger_env.pull_request_number = value,
                        "pr-source" => trigger_env.pull_request_source_branch = value,
                        _ => {}
                    }
                }
            }
            "identity" => {
                for (key, value) in child_strings(node) {
                    match key.as_str() {
                        "release" => identity_env.release = value,
                        "build-number" => identity_env.build_number = value,
                        "build-suffix" => identity_env.build_suffix = value,
                        _ => {}
                    }
                }
            }
            "git" => {
                for (key, value) in child_strings(node) {
                    if key == "count-ref" {
                        git.count_ref = value;
                    }
                }
            }
            "vars" => {
                for (name, value) in child_strings(node) {
                    if name.contains('.') {
                        return Err(ConfigError::InvalidValue {
                            field: format!("vars.{}", name),
                            message: "variable names must not contain '.'".to_string(),
                        });
                    }
                    if vars.insert(name.clone(), value).is_some() {
                        return Err(ConfigError::Duplicate(format!("variable {}", name)));
                    }
                }
            }
            "build" => build = Some(parse_step(node, "build")?),
            "install" => {
                let step = parse_step(node, "install")?;
                let with = child_nodes(node)
                    .filter(|c| c.name().value() == "with")
                    .flat_map(get_all_string_args)
                    .collect();
                install = Some(InstallConfig { step, with });
            }
            "test" => test = Some(parse_test(node)?),
            _ => {} // Ignore unknown nodes
        }
    }

    if package.is_empty() {
        return Err(ConfigError::MissingField("package name".to_string()));
    }
    if interpreters.is_empty() {
        return Err(ConfigError::MissingField(
            "at least one python version".to_string(),
        ));
    }

    Ok(WheelhouseConfig {
        package,
        base_version,
        dist_dir,
        artifact_ext,
        interpreters,
        branches,
        trigger_env,
        identity_env,
        git,
        build: build.ok_or_else(|| ConfigError::MissingField("build".to_string()))?,
        install: install.ok_or_else(|| ConfigError::MissingField("install".to_string()))?,
        test: test.ok_or_else(|| ConfigError::MissingField("test".to_string()))?,
        vars,
    })
}

fn parse_python(node: &KdlNode) -> ConfigResult<InterpreterEntry> {
    let raw = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("python version".to_string()))?;
    let version: PythonVersion = raw.parse().map_err(|e| ConfigError::InvalidValue {
        field: "python".to_string(),
        message: format!("{}", e),
    })?;

    let eligibility = match get_string_prop(node, "when").as_deref() {
        None | Some("always") => Eligibility::Always,
        Some("release") => Eligibility::ReleaseOnly,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                field: format!("python {} when", version),
                message: format!("expected \"always\" or \"release\", got {:?}", other),
            });
        }
    };

    let platforms = get_string_list_prop(node, "platforms")
        .iter()
        .map(|p| {
            p.parse::<Platform>().map_err(|e| ConfigError::InvalidValue {
                field: format!("python {} platforms", version),
                message: e.to_string(),
            })
        })
        .collect::<ConfigResult<Vec<_>>>()?;

    Ok(InterpreterEntry {
        version,
        eligibility,
        platforms,
    })
}

fn parse_branches(node: &KdlNode) -> ConfigResult<BranchPolicy> {
    let mut policy = BranchPolicy::default();
    for (key, value) in child_strings(node) {
        match key.as_str() {
            "main" => policy.main_branch = value,
            "release-prefix" => policy.release_prefix = value,
            _ => {}
        }
    }
    if policy.main_branch.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "branches main".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    // An empty prefix would turn every branch into a release.
    if policy.release_prefix.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "branches release-prefix".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(policy)
}

fn parse_step(node: &KdlNode, name: &str) -> ConfigResult<StepConfig> {
    let mut step = StepConfig::default();

    for child in child_nodes(node) {
        match child.name().value() {
            "run" => step.command = get_all_string_args(child),
            "timeout-secs" => {
                let secs = get_first_int_arg(child).ok_or_else(|| ConfigError::InvalidValue {
                    field: format!("{} timeout-secs", name),
                    message: "expected a positive integer".to_string(),
                })?;
                step.timeout = Some(Duration::from_secs(secs));
            }
            "env" => {
                for (key, value) in child_strings(child) {
                    step.env.insert(key, value);
                }
            }
            _ => {}
        }
    }

    if step.command.is_empty() {
        return Err(ConfigError::MissingField(format!("run for {}", name)));
    }
    Ok(step)
}

fn parse_test(node: &KdlNode) -> ConfigResult<TestConfig> {
    let step = parse_step(node, "test")?;
    let mut args = Vec::new();
    let mut policy = TestPolicy::default();

    for child in child_nodes(node) {
        match child.name().value() {
            "args" => args.extend(get_all_string_args(child)),
            "max-failures" => {
                let max = get_first_int_arg(child)
                    .filter(|n| *n > 0)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| ConfigError::InvalidValue {
                        field: "test max-failures".to_string(),
                        message: "expected a positive integer".to_string(),
                    })?;
                policy.max_failures = max;
            }
            _ => {}
        }
    }

    Ok(TestConfig { step, args, policy })
}

// Helper functions for extracting values from KDL nodes

fn child_nodes(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children()
        .map(|children| children.nodes())
        .unwrap_or_default()
        .iter()
}

/// `key "value"` pairs from a node's children.
fn child_strings(node: &KdlNode) -> Vec<(String, String)> {
    child_nodes(node)
        .filter_map(|child| {
            get_first_string_arg(child).map(|v| (child.name().value().to_string(), v))
        })
        .collect()
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_int_arg(node: &KdlNode) -> Option<u64> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
        .and_then(|n| u64::try_from(n).ok())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_string_list_prop(node: &KdlNode, name: &str) -> Vec<String> {
    let mut result = Vec::new();

    // Repeated attributes like platforms="linux" platforms="macos"
    for entry in node.entries() {
        if let Some(entry_name) = entry.name() {
            if entry_name.value() == name {
                if let Some(s) = entry.value().as_string() {
                    result.push(s.to_string());
                }
            }
        }
    }

    if !result.is_empty() {
        return result;
    }

    // Block syntax
    for child in child_nodes(node) {
        if child.name().value() == name {
            return get_all_string_args(child);
        }
    }

    Vec::new()
}
