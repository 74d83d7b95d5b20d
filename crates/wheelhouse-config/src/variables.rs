//! Variable interpolation for step commands.
//!
//! Supports variables like:
//! - `${cell.python}` - Interpreter version (`3.10`)
//! - `${cell.tag}` - Interpreter tag (`cp310`)
//! - `${cell.platform}` - Platform name
//! - `${identity.release}` - `1` for releases, empty otherwise
//! - `${identity.build_number}` - Build number, if any
//! - `${identity.build_suffix}` - Build suffix, if any
//! - `${identity.version}` - Base version stamped with the identity
//! - `${trigger.branch}` - Branch that triggered the run
//! - `${package}` - Package name
//! - `${run.id}` - Run ID
//! - `${env.VAR_NAME}` - Environment variable
//! - `${timestamp}` - Unix timestamp
//! - `${date}` - ISO date (YYYY-MM-DD)

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use wheelhouse_core::{BuildIdentity, MatrixCell, RunId, TriggerContext};

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub cell: CellVars,
    pub identity: IdentityVars,
    pub trigger: TriggerVars,
    pub run: RunVars,
    pub package: String,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// User variables from the `vars` block
    pub custom: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct CellVars {
    pub python: String,
    pub tag: String,
    pub platform: String,
}

#[derive(Debug, Clone, Default)]
pub struct IdentityVars {
    pub release: bool,
    pub build_number: Option<String>,
    pub build_suffix: Option<String>,
    /// Stamped version; `None` when no base version is configured.
    pub version: Option<String>,
}

impl From<&MatrixCell> for CellVars {
    fn from(cell: &MatrixCell) -> Self {
        Self {
            python: cell.interpreter_version.to_string(),
            tag: cell.interpreter_tag(),
            platform: cell.platform.to_string(),
        }
    }
}

impl IdentityVars {
    /// Identity variables; `base_version` feeds `${identity.version}`.
    pub fn new(identity: &BuildIdentity, base_version: Option<&str>) -> Self {
        Self {
            release: identity.is_release(),
            build_number: identity.build_number().map(|n| n.to_string()),
            build_suffix: identity.build_suffix().map(str::to_string),
            version: base_version.map(|base| identity.stamp(base)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TriggerVars {
    pub branch: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunVars {
    pub id: String,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

impl VariableContext {
    /// Create a new empty variable context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate environment variables from the current process environment.
    pub fn populate_env(&mut self) {
        for (key, value) in std::env::vars() {
            self.env.insert(key, value);
        }
    }

    /// Add a custom variable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.custom.insert(name.to_string(), value.into());
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["cell", "python"] => Some(self.cell.python.clone()),
            ["cell", "tag"] => Some(self.cell.tag.clone()),
            ["cell", "platform"] => Some(self.cell.platform.clone()),

            ["identity", "release"] => {
                Some(if self.identity.release { "1" } else { "" }.to_string())
            }
            ["identity", "build_number"] => {
                Some(self.identity.build_number.clone().unwrap_or_default())
            }
            ["identity", "build_suffix"] => {
                Some(self.identity.build_suffix.clone().unwrap_or_default())
            }
            ["identity", "version"] => self.identity.version.clone(),

            ["trigger", "branch"] => Some(self.trigger.branch.clone()),
            ["run", "id"] => Some(self.run.id.clone()),

            ["env", name] => self.env.get(*name).cloned(),

            ["timestamp"] => Some(chrono::Utc::now().timestamp().to_string()),
            ["date"] => Some(chrono::Utc::now().format("%Y-%m-%d").to_string()),

            ["package"] => Some(self.package.clone()),
            // Single-part names check custom variables
            [name] => self.custom.get(*name).cloned(),

            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    /// Unknown variables are left untouched.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    pub fn interpolate_vec(&self, inputs: &[String]) -> Vec<String> {
        inputs.iter().map(|s| self.interpolate(s)).collect()
    }

    pub fn interpolate_map(&self, map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.interpolate(v)))
            .collect()
    }

    /// Variable names in `input` that do not resolve.
    pub fn unresolved(&self, input: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(input)
            .map(|caps| caps[1].to_string())
            .filter(|name| self.resolve(name).is_none())
            .collect()
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.ctx.package = package.into();
        self
    }

    pub fn with_cell(mut self, cell: &MatrixCell) -> Self {
        self.ctx.cell = CellVars::from(cell);
        self
    }

    pub fn with_identity(mut self, identity: &BuildIdentity, base_version: Option<&str>) -> Self {
        self.ctx.identity = IdentityVars::new(identity, base_version);
        self
    }

    pub fn with_trigger(mut self, trigger: &TriggerContext) -> Self {
        self.ctx.trigger.branch = trigger.branch_name.clone();
        self
    }

    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.ctx.run.id = run_id.to_string();
        self
    }

    pub fn with_env(mut self) -> Self {
        self.ctx.populate_env();
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelhouse_core::{Platform, PythonVersion};

    fn cell_ctx() -> VariableContext {
        let cell = MatrixCell::eligible(Platform::Linux, PythonVersion::new(3, 10));
        VariableContextBuilder::new()
            .with_package("datatable")
            .with_cell(&cell)
            .with_identity(&BuildIdentity::numbered(42), Some("1.1.0"))
            .with_trigger(&TriggerContext::branch("main"))
            .build()
    }

    #[test]
    fn test_cell_variables() {
        let ctx = cell_ctx();
        assert_eq!(ctx.interpolate("python${cell.python}"), "python3.10");
        assert_eq!(ctx.interpolate("${cell.tag}"), "cp310");
        assert_eq!(ctx.interpolate("${cell.platform}"), "linux");
    }

    #[test]
    fn test_identity_variables() {
        let ctx = cell_ctx();
        assert_eq!(ctx.interpolate("${identity.build_number}"), "42");
        assert_eq!(ctx.interpolate("[${identity.build_suffix}]"), "[]");
        assert_eq!(ctx.interpolate("[${identity.release}]"), "[]");
        assert_eq!(ctx.interpolate("${identity.version}"), "1.1.0.dev42");
    }

    #[test]
    fn test_release_identity() {
        let ctx = VariableContextBuilder::new()
            .with_identity(&BuildIdentity::release(), Some("2.1"))
            .build();
        assert_eq!(ctx.interpolate("${identity.release}"), "1");
        assert_eq!(ctx.interpolate("${identity.version}"), "2.1");
    }

    #[test]
    fn test_version_without_base_is_unresolved() {
        let ctx = VariableContextBuilder::new()
            .with_identity(&BuildIdentity::suffixed("PR7.9"), None)
            .build();
        assert_eq!(ctx.interpolate("${identity.version}"), "${identity.version}");
        assert_eq!(ctx.interpolate("${identity.build_suffix}"), "PR7.9");
    }

    #[test]
    fn test_package_and_trigger() {
        let ctx = cell_ctx();
        assert_eq!(
            ctx.interpolate("${package} on ${trigger.branch}"),
            "datatable on main"
        );
    }

    #[test]
    fn test_run_id() {
        let id = RunId::new();
        let ctx = VariableContextBuilder::new().with_run(id).build();
        assert_eq!(ctx.interpolate("${run.id}"), id.to_string());
    }

    #[test]
    fn test_env_variables() {
        let mut ctx = VariableContext::new();
        ctx.env.insert("HOME".to_string(), "/home/ci".to_string());
        assert_eq!(ctx.interpolate("${env.HOME}/.cache"), "/home/ci/.cache");
    }

    #[test]
    fn test_custom_variables() {
        let mut ctx = VariableContext::new();
        ctx.set("extras", "[test]");
        assert_eq!(ctx.interpolate("pkg${extras}"), "pkg[test]");
        assert_eq!(ctx.interpolate("${extras.more}"), "${extras.more}");
    }

    #[test]
    fn test_unknown_variable_preserved() {
        let ctx = cell_ctx();
        assert_eq!(ctx.interpolate("${unknown.var}"), "${unknown.var}");
        assert_eq!(ctx.unresolved("${cell.tag} ${nope}"), vec!["nope"]);
    }

    #[test]
    fn test_interpolate_vec_and_map() {
        let ctx = cell_ctx();
        let cmd = vec!["python${cell.python}".to_string(), "-m".to_string()];
        assert_eq!(ctx.interpolate_vec(&cmd), vec!["python3.10", "-m"]);

        let mut env = BTreeMap::new();
        env.insert("TAG".to_string(), "${cell.tag}".to_string());
        assert_eq!(ctx.interpolate_map(&env).get("TAG").unwrap(), "cp310");
    }

    #[test]
    fn test_date_variable() {
        let ctx = VariableContext::new();
        let date = ctx.interpolate("${date}");
        assert_eq!(date.len(), 10);
        assert!(date.contains('-'));
    }
}
