//! Snapshot of the CI event that started this run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Branch and pull-request information captured once at run start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerContext {
    /// Name of the branch the CI host is building.
    pub branch_name: String,
    /// Pull-request number, when the run was triggered by a pull request.
    pub pull_request_number: Option<u64>,
    /// Source branch of the pull request.
    pub pull_request_source_branch: Option<String>,
}

/// Names of the environment variables the trigger snapshot is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEnvNames {
    pub branch: String,
    pub pull_request_number: String,
    pub pull_request_source_branch: String,
}

impl Default for TriggerEnvNames {
    fn default() -> Self {
        Self {
            branch: "BUILD_SOURCEBRANCHNAME".to_string(),
            pull_request_number: "SYSTEM_PULLREQUEST_PULLREQUESTNUMBER".to_string(),
            pull_request_source_branch: "SYSTEM_PULLREQUEST_SOURCEBRANCH".to_string(),
        }
    }
}

const HEADS_PREFIX: &str = "refs/heads/";

impl TriggerContext {
    /// Trigger for a plain branch build.
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            branch_name: name.into(),
            pull_request_number: None,
            pull_request_source_branch: None,
        }
    }

    /// Trigger for a pull-request build.
    pub fn pull_request(
        branch: impl Into<String>,
        number: u64,
        source_branch: impl Into<String>,
    ) -> Self {
        Self {
            branch_name: branch.into(),
            pull_request_number: Some(number),
            pull_request_source_branch: Some(source_branch.into()),
        }
    }

    /// Read the trigger from the process environment.
    pub fn from_env(names: &TriggerEnvNames) -> Result<Self> {
        Self::from_lookup(names, |key| std::env::var(key).ok())
    }

    /// Build the trigger from an arbitrary variable lookup.
    ///
    /// Empty values count as unset, and a leading `refs/heads/` is stripped
    /// from branch names. The branch variable is required; a pull-request
    /// number that is set but not numeric is rejected.
    pub fn from_lookup<F>(names: &TriggerEnvNames, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let branch_name = read(&names.branch)
            .map(|b| strip_heads(&b))
            .ok_or_else(|| {
                Error::InvalidTrigger(format!("branch variable {} is not set", names.branch))
            })?;

        let pull_request_number = match read(&names.pull_request_number) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                Error::InvalidTrigger(format!(
                    "{} is not a pull-request number: {:?}",
                    names.pull_request_number, raw
                ))
            })?),
            None => None,
        };

        let pull_request_source_branch =
            read(&names.pull_request_source_branch).map(|b| strip_heads(&b));

        Ok(Self {
            branch_name,
            pull_request_number,
            pull_request_source_branch,
        })
    }
}

fn strip_heads(branch: &str) -> String {
    branch
        .strip_prefix(HEADS_PREFIX)
        .unwrap_or(branch)
        .to_string()
}

impl fmt::Display for TriggerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.pull_request_number, &self.pull_request_source_branch) {
            (Some(n), Some(src)) => write!(f, "PR #{} from {} on {}", n, src, self.branch_name),
            (Some(n), None) => write!(f, "PR #{} on {}", n, self.branch_name),
            _ => write!(f, "branch {}", self.branch_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_branch_only() {
        let names = TriggerEnvNames::default();
        let ctx =
            TriggerContext::from_lookup(&names, lookup(&[("BUILD_SOURCEBRANCHNAME", "main")]))
                .unwrap();
        assert_eq!(ctx, TriggerContext::branch("main"));
    }

    #[test]
    fn test_pull_request_fields() {
        let names = TriggerEnvNames::default();
        let ctx = TriggerContext::from_lookup(
            &names,
            lookup(&[
                ("BUILD_SOURCEBRANCHNAME", "merge"),
                ("SYSTEM_PULLREQUEST_PULLREQUESTNUMBER", "17"),
                ("SYSTEM_PULLREQUEST_SOURCEBRANCH", "refs/heads/feature/x"),
            ]),
        )
        .unwrap();
        assert_eq!(ctx.pull_request_number, Some(17));
        assert_eq!(ctx.pull_request_source_branch.as_deref(), Some("feature/x"));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let names = TriggerEnvNames::default();
        let ctx = TriggerContext::from_lookup(
            &names,
            lookup(&[
                ("BUILD_SOURCEBRANCHNAME", "dev"),
                ("SYSTEM_PULLREQUEST_PULLREQUESTNUMBER", ""),
                ("SYSTEM_PULLREQUEST_SOURCEBRANCH", "  "),
            ]),
        )
        .unwrap();
        assert_eq!(ctx, TriggerContext::branch("dev"));
    }

    #[test]
    fn test_missing_branch_is_an_error() {
        let names = TriggerEnvNames::default();
        let err = TriggerContext::from_lookup(&names, lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::InvalidTrigger(_)));
    }

    #[test]
    fn test_non_numeric_pr_number_is_an_error() {
        let names = TriggerEnvNames::default();
        let err = TriggerContext::from_lookup(
            &names,
            lookup(&[
                ("BUILD_SOURCEBRANCHNAME", "merge"),
                ("SYSTEM_PULLREQUEST_PULLREQUESTNUMBER", "$(System.PullRequest.Number)"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidTrigger(_)));
    }

    #[test]
    fn test_from_env_reads_custom_names() {
        let names = TriggerEnvNames {
            branch: "WH_TEST_BRANCH".to_string(),
            pull_request_number: "WH_TEST_PR".to_string(),
            pull_request_source_branch: "WH_TEST_PR_SRC".to_string(),
        };
        temp_env::with_vars(
            [
                ("WH_TEST_BRANCH", Some("merge")),
                ("WH_TEST_PR", Some("3")),
                ("WH_TEST_PR_SRC", Some("rel-1.0")),
            ],
            || {
                let ctx = TriggerContext::from_env(&names).unwrap();
                assert_eq!(ctx, TriggerContext::pull_request("merge", 3, "rel-1.0"));
            },
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(TriggerContext::branch("main").to_string(), "branch main");
        assert_eq!(
            TriggerContext::pull_request("merge", 7, "feature/x").to_string(),
            "PR #7 from feature/x on merge"
        );
    }
}
