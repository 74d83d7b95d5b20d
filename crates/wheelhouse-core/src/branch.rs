//! Branch classification.
//!
//! Maps a [`TriggerContext`] to the kind of build it represents. This is a
//! pure decision table: no process, filesystem or environment access.

use serde::{Deserialize, Serialize};

use crate::TriggerContext;

/// What kind of build a trigger represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    /// A release build: no build number or suffix is stamped.
    Release,
    /// A pull request that is not from a release branch.
    PullRequest { number: u64 },
    /// A push to the main line.
    MainBranch,
    /// A push to any other branch.
    OtherBranch { name: String },
}

/// Branch naming rules used by [`BranchPolicy::classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPolicy {
    /// Name of the main line.
    pub main_branch: String,
    /// Prefix that marks a release branch (`rel-` matches `rel-*`).
    pub release_prefix: String,
}

impl Default for BranchPolicy {
    fn default() -> Self {
        Self {
            main_branch: "main".to_string(),
            release_prefix: "rel-".to_string(),
        }
    }
}

impl BranchPolicy {
    /// Whether `branch` matches the release pattern `<prefix>*`.
    pub fn is_release_branch(&self, branch: &str) -> bool {
        branch.starts_with(self.release_prefix.as_str())
    }

    /// Classify a trigger. First match wins:
    ///
    /// 1. pull request from a release branch -> `Release`, other pull request
    ///    -> `PullRequest`
    /// 2. main branch -> `MainBranch`
    /// 3. release branch -> `Release`
    /// 4. anything else -> `OtherBranch`
    pub fn classify(&self, ctx: &TriggerContext) -> Classification {
        if let Some(number) = ctx.pull_request_number {
            let from_release = ctx
                .pull_request_source_branch
                .as_deref()
                .is_some_and(|src| self.is_release_branch(src));
            return if from_release {
                Classification::Release
            } else {
                Classification::PullRequest { number }
            };
        }

        if ctx.branch_name == self.main_branch {
            Classification::MainBranch
        } else if self.is_release_branch(&ctx.branch_name) {
            Classification::Release
        } else {
            Classification::OtherBranch {
                name: ctx.branch_name.clone(),
            }
        }
    }
}

/// Classify with the default policy (`main`, `rel-*`).
pub fn classify(ctx: &TriggerContext) -> Classification {
    BranchPolicy::default().classify(ctx)
}
