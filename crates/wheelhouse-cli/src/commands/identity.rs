//! Print the resolved build identity for consumption by later CI steps.

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use wheelhouse_core::{BuildIdentity, Classification, IdentityEnvNames};

use crate::TriggerArgs;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum IdentityFormat {
    /// `export NAME=value` lines
    Shell,
    /// A JSON object
    Json,
    /// Azure Pipelines `##vso[task.setvariable]` logging commands
    Azure,
}

#[derive(Serialize)]
struct IdentityReport<'a> {
    classification: Classification,
    identity: &'a BuildIdentity,
    version: Option<String>,
    env: BTreeMap<String, String>,
}

pub async fn run(config_path: &Path, trigger: &TriggerArgs, format: IdentityFormat) -> Result<()> {
    let resolved = super::resolve(config_path, trigger).await?;
    let config = &resolved.config;

    let report = IdentityReport {
        classification: config.branches.classify(&resolved.trigger),
        identity: &resolved.identity,
        version: config
            .base_version
            .as_deref()
            .map(|base| resolved.identity.stamp(base)),
        env: resolved
            .identity
            .to_env(&config.identity_env)
            .into_iter()
            .collect(),
    };

    print!("{}", render(&report, &config.identity_env, format)?);
    Ok(())
}

fn render(
    report: &IdentityReport<'_>,
    names: &IdentityEnvNames,
    format: IdentityFormat,
) -> Result<String> {
    let mut out = String::new();
    match format {
        IdentityFormat::Shell => {
            for (name, value) in &report.env {
                out.push_str(&format!("export {}={}\n", name, shell_quote(value)));
            }
            for name in report.identity.unset_env(names) {
                out.push_str(&format!("unset {}\n", name));
            }
        }
        IdentityFormat::Json => {
            out.push_str(&serde_json::to_string_pretty(report)?);
            out.push('\n');
        }
        IdentityFormat::Azure => {
            for (name, value) in &report.env {
                out.push_str(&format!("##vso[task.setvariable variable={}]{}\n", name, value));
            }
        }
    }
    Ok(out)
}

/// Single-quote `value` unless it only holds characters safe in a shell word.
fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-+/:".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(identity: &BuildIdentity, classification: Classification) -> IdentityReport<'_> {
        IdentityReport {
            classification,
            identity,
            version: Some(identity.stamp("1.1.0")),
            env: identity
                .to_env(&IdentityEnvNames::default())
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn test_shell_format() {
        let identity = BuildIdentity::numbered(42);
        let out = render(
            &report(&identity, Classification::MainBranch),
            &IdentityEnvNames::default(),
            IdentityFormat::Shell,
        )
        .unwrap();
        assert_eq!(
            out,
            "export DT_BUILD_NUMBER=42\nunset DT_RELEASE\nunset DT_BUILD_SUFFIX\n"
        );
    }

    #[test]
    fn test_azure_format() {
        let identity = BuildIdentity::suffixed("PR7.9");
        let out = render(
            &report(&identity, Classification::PullRequest { number: 7 }),
            &IdentityEnvNames::default(),
            IdentityFormat::Azure,
        )
        .unwrap();
        assert_eq!(out, "##vso[task.setvariable variable=DT_BUILD_SUFFIX]PR7.9\n");
    }

    #[test]
    fn test_json_format() {
        let identity = BuildIdentity::release();
        let out = render(
            &report(&identity, Classification::Release),
            &IdentityEnvNames::default(),
            IdentityFormat::Json,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["classification"]["kind"], "release");
        assert_eq!(value["version"], "1.1.0");
        assert_eq!(value["env"]["DT_RELEASE"], "1");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("feature.12"), "feature.12");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
