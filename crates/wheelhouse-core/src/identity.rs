//! Build identity resolution.
//!
//! A [`BuildIdentity`] is computed once per run from the trigger and the
//! repository commit count, then handed read-only to every cell so all
//! artifacts of the run carry the same version metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::branch::{BranchPolicy, Classification};
use crate::TriggerContext;

/// Repository metadata needed to number builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitContext {
    /// Number of commits reachable from the counted ref.
    pub main_commit_count: u64,
}

/// Version metadata stamped onto every artifact of a run.
///
/// At most one of `build_number` and `build_suffix` is set, and neither is
/// set for a release. The constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildIdentity {
    is_release: bool,
    build_number: Option<u64>,
    build_suffix: Option<String>,
}

impl BuildIdentity {
    pub fn release() -> Self {
        Self {
            is_release: true,
            build_number: None,
            build_suffix: None,
        }
    }

    pub fn numbered(build_number: u64) -> Self {
        Self {
            is_release: false,
            build_number: Some(build_number),
            build_suffix: None,
        }
    }

    pub fn suffixed(build_suffix: impl Into<String>) -> Self {
        Self {
            is_release: false,
            build_number: None,
            build_suffix: Some(build_suffix.into()),
        }
    }

    /// Resolve with the default branch policy.
    pub fn resolve(ctx: &TriggerContext, git: &GitContext) -> Self {
        Self::resolve_with(&BranchPolicy::default(), ctx, git)
    }

    /// Resolve the identity for a trigger and commit count.
    ///
    /// Suffixed builds use `count - 1`: on pull-request runs the CI host
    /// checks out a synthetic merge commit that is not part of the branch.
    /// The offset is applied to every suffixed build, not only pull requests.
    pub fn resolve_with(policy: &BranchPolicy, ctx: &TriggerContext, git: &GitContext) -> Self {
        let main_build_id = git.main_commit_count;
        let branch_build_id = i128::from(main_build_id) - 1;

        match policy.classify(ctx) {
            Classification::Release => Self::release(),
            Classification::PullRequest { number } => {
                Self::suffixed(format!("PR{}.{}", number, branch_build_id))
            }
            Classification::MainBranch => Self::numbered(main_build_id),
            Classification::OtherBranch { name } => {
                Self::suffixed(format!("{}.{}", name, branch_build_id))
            }
        }
    }

    pub fn is_release(&self) -> bool {
        self.is_release
    }

    pub fn build_number(&self) -> Option<u64> {
        self.build_number
    }

    pub fn build_suffix(&self) -> Option<&str> {
        self.build_suffix.as_deref()
    }

    /// Environment variables describing this identity. Only the variable
    /// that applies is returned.
    pub fn to_env(&self, names: &IdentityEnvNames) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if self.is_release {
            vars.push((names.release.clone(), "1".to_string()));
        }
        if let Some(n) = self.build_number {
            vars.push((names.build_number.clone(), n.to_string()));
        }
        if let Some(s) = &self.build_suffix {
            vars.push((names.build_suffix.clone(), s.clone()));
        }
        vars
    }

    /// Identity variables that must not leak into a subprocess from the
    /// parent environment because this identity does not set them.
    pub fn unset_env(&self, names: &IdentityEnvNames) -> Vec<String> {
        let set: Vec<String> = self.to_env(names).into_iter().map(|(k, _)| k).collect();
        names
            .all()
            .into_iter()
            .filter(|name| !set.contains(name))
            .collect()
    }

    /// Render a PEP 440 version from the package's base version.
    ///
    /// Releases keep `base`, numbered builds become `base.devN` and
    /// suffixed builds carry the suffix as a local version label.
    pub fn stamp(&self, base: &str) -> String {
        if let Some(n) = self.build_number {
            format!("{}.dev{}", base, n)
        } else if let Some(suffix) = &self.build_suffix {
            format!("{}+{}", base, local_label(suffix))
        } else {
            base.to_string()
        }
    }
}

/// Local version labels only allow ASCII alphanumerics separated by dots.
fn local_label(suffix: &str) -> String {
    suffix
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

impl fmt::Display for BuildIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.build_number, &self.build_suffix) {
            (Some(n), _) => write!(f, "build #{}", n),
            (_, Some(s)) => write!(f, "build {}", s),
            _ => write!(f, "release"),
        }
    }
}

/// Names of the environment variables the identity is exported under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEnvNames {
    pub release: String,
    pub build_number: String,
    pub build_suffix: String,
}

impl IdentityEnvNames {
    pub fn all(&self) -> Vec<String> {
        vec![
            self.release.clone(),
            self.build_number.clone(),
            self.build_suffix.clone(),
        ]
    }
}

impl Default for IdentityEnvNames {
    fn default() -> Self {
        Self {
            release: "DT_RELEASE".to_string(),
            build_number: "DT_BUILD_NUMBER".to_string(),
            build_suffix: "DT_BUILD_SUFFIX".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git(count: u64) -> GitContext {
        GitContext {
            main_commit_count: count,
        }
    }

    fn assert_invariant(id: &BuildIdentity) {
        assert!(!(id.build_number().is_some() && id.build_suffix().is_some()));
        if id.is_release() {
            assert!(id.build_number().is_none());
            assert!(id.build_suffix().is_none());
        }
    }

    #[test]
    fn test_main_branch_gets_commit_count() {
        let id = BuildIdentity::resolve(&TriggerContext::branch("main"), &git(42));
        assert_eq!(id, BuildIdentity::numbered(42));
    }

    #[test]
    fn test_pull_request_suffix_uses_offset() {
        let ctx = TriggerContext::pull_request("merge", 7, "feature/x");
        let id = BuildIdentity::resolve(&ctx, &git(10));
        assert_eq!(id, BuildIdentity::suffixed("PR7.9"));
    }

    #[test]
    fn test_release_branch() {
        let id = BuildIdentity::resolve(&TriggerContext::branch("rel-2.1"), &git(500));
        assert_eq!(id, BuildIdentity::release());
        assert!(id.is_release());
    }

    #[test]
    fn test_release_pull_request() {
        let ctx = TriggerContext::pull_request("merge", 3, "rel-1.0");
        assert_eq!(BuildIdentity::resolve(&ctx, &git(8)), BuildIdentity::release());
    }

    #[test]
    fn test_other_branch_offset_applies_outside_pull_requests() {
        let id = BuildIdentity::resolve(&TriggerContext::branch("dev"), &git(10));
        assert_eq!(id, BuildIdentity::suffixed("dev.9"));
    }

    #[test]
    fn test_zero_commits_goes_negative() {
        let id = BuildIdentity::resolve(&TriggerContext::branch("dev"), &git(0));
        assert_eq!(id.build_suffix(), Some("dev.-1"));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let contexts = [
            TriggerContext::branch("main"),
            TriggerContext::branch("rel-1"),
            TriggerContext::branch("topic"),
            TriggerContext::pull_request("merge", 11, "topic"),
            TriggerContext::pull_request("merge", 11, "rel-3"),
        ];
        for ctx in &contexts {
            for count in [0, 1, 99, u64::MAX] {
                let a = BuildIdentity::resolve(ctx, &git(count));
                let b = BuildIdentity::resolve(ctx, &git(count));
                assert_eq!(a, b);
                assert_invariant(&a);
            }
        }
    }

    #[test]
    fn test_to_env_is_mutually_exclusive() {
        let names = IdentityEnvNames::default();
        assert_eq!(
            BuildIdentity::release().to_env(&names),
            vec![("DT_RELEASE".to_string(), "1".to_string())]
        );
        assert_eq!(
            BuildIdentity::numbered(5).to_env(&names),
            vec![("DT_BUILD_NUMBER".to_string(), "5".to_string())]
        );
        assert_eq!(
            BuildIdentity::suffixed("PR1.2").to_env(&names),
            vec![("DT_BUILD_SUFFIX".to_string(), "PR1.2".to_string())]
        );
    }

    #[test]
    fn test_unset_env_lists_the_other_names() {
        let names = IdentityEnvNames::default();
        assert_eq!(
            BuildIdentity::numbered(5).unset_env(&names),
            vec!["DT_RELEASE".to_string(), "DT_BUILD_SUFFIX".to_string()]
        );
    }

    #[test]
    fn test_stamp() {
        assert_eq!(BuildIdentity::release().stamp("1.1.0"), "1.1.0");
        assert_eq!(BuildIdentity::numbered(42).stamp("1.1.0"), "1.1.0.dev42");
        assert_eq!(
            BuildIdentity::suffixed("PR7.9").stamp("1.1.0"),
            "1.1.0+pr7.9"
        );
        assert_eq!(
            BuildIdentity::suffixed("feature//Fread_x.9").stamp("1.1.0"),
            "1.1.0+feature.fread.x.9"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(BuildIdentity::release().to_string(), "release");
        assert_eq!(BuildIdentity::numbered(3).to_string(), "build #3");
        assert_eq!(BuildIdentity::suffixed("dev.2").to_string(), "build dev.2");
    }
}
