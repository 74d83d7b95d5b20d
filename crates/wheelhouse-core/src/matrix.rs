//! Build matrix cells.
//!
//! A cell is one (platform, interpreter version) combination. Cells are
//! enumerated fresh on every run from the configured interpreter entries,
//! the platform this invocation runs on, and the resolved identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{BuildIdentity, Error, Result};

/// Operating system a matrix invocation runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    #[serde(rename = "macos")]
    MacOs,
    Windows,
}

impl Platform {
    /// Platform of the running process, if it is one we build on.
    pub fn current() -> Option<Self> {
        match std::env::consts::OS {
            "linux" => Some(Platform::Linux),
            "macos" => Some(Platform::MacOs),
            "windows" => Some(Platform::Windows),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Platform::Linux),
            "macos" | "darwin" | "osx" => Ok(Platform::MacOs),
            "windows" | "win" => Ok(Platform::Windows),
            other => Err(Error::InvalidInput(format!("unknown platform: {}", other))),
        }
    }
}

/// A CPython `major.minor` version such as `3.10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
}

impl PythonVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Interpreter tag used in artifact names, e.g. `cp310`.
    pub fn tag(&self) -> String {
        format!("cp{}{}", self.major, self.minor)
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PythonVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("expected major.minor version, got {:?}", s));
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        let major = major.parse().map_err(|_| invalid())?;
        let minor = minor.parse().map_err(|_| invalid())?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for PythonVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PythonVersion> for String {
    fn from(version: PythonVersion) -> Self {
        version.to_string()
    }
}

/// When an interpreter entry takes part in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    #[default]
    Always,
    /// Legacy interpreters that are only built for releases.
    ReleaseOnly,
}

/// One configured interpreter version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterEntry {
    pub version: PythonVersion,
    pub eligibility: Eligibility,
    /// Platforms this version is built on. Empty means every platform.
    pub platforms: Vec<Platform>,
}

impl InterpreterEntry {
    pub fn new(version: PythonVersion) -> Self {
        Self {
            version,
            eligibility: Eligibility::Always,
            platforms: Vec::new(),
        }
    }

    pub fn release_only(mut self) -> Self {
        self.eligibility = Eligibility::ReleaseOnly;
        self
    }

    pub fn on(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = platforms.into_iter().collect();
        self
    }

    fn skip_reason(&self, platform: Platform, identity: &BuildIdentity) -> Option<SkipReason> {
        if !self.platforms.is_empty() && !self.platforms.contains(&platform) {
            return Some(SkipReason::PlatformExcluded { platform });
        }
        if self.eligibility == Eligibility::ReleaseOnly && !identity.is_release() {
            return Some(SkipReason::ReleaseOnly);
        }
        None
    }
}

/// Why a cell is not executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    ReleaseOnly,
    PlatformExcluded { platform: Platform },
    Filtered,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ReleaseOnly => write!(f, "only built for releases"),
            SkipReason::PlatformExcluded { platform } => write!(f, "not built on {}", platform),
            SkipReason::Filtered => write!(f, "excluded by filter"),
        }
    }
}

/// One (platform, interpreter version) combination of the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixCell {
    pub platform: Platform,
    pub interpreter_version: PythonVersion,
    pub eligible: bool,
    pub skip_reason: Option<SkipReason>,
}

impl MatrixCell {
    pub fn eligible(platform: Platform, interpreter_version: PythonVersion) -> Self {
        Self {
            platform,
            interpreter_version,
            eligible: true,
            skip_reason: None,
        }
    }

    pub fn skipped(
        platform: Platform,
        interpreter_version: PythonVersion,
        reason: SkipReason,
    ) -> Self {
        Self {
            platform,
            interpreter_version,
            eligible: false,
            skip_reason: Some(reason),
        }
    }

    /// Mark this cell as not selected for the run.
    pub fn filtered(self) -> Self {
        if !self.eligible {
            return self;
        }
        Self::skipped(self.platform, self.interpreter_version, SkipReason::Filtered)
    }

    /// Interpreter tag the cell's artifact must carry.
    pub fn interpreter_tag(&self) -> String {
        self.interpreter_version.tag()
    }

    /// Enumerate the cells for `platform` in declaration order.
    pub fn enumerate(
        entries: &[InterpreterEntry],
        platform: Platform,
        identity: &BuildIdentity,
    ) -> Vec<MatrixCell> {
        entries
            .iter()
            .map(|entry| match entry.skip_reason(platform, identity) {
                Some(reason) => MatrixCell::skipped(platform, entry.version, reason),
                None => MatrixCell::eligible(platform, entry.version),
            })
            .collect()
    }
}

impl fmt::Display for MatrixCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/py{}", self.platform, self.interpreter_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PythonVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_python_version_parse_and_tag() {
        let version = v("3.10");
        assert_eq!(version, PythonVersion::new(3, 10));
        assert_eq!(version.tag(), "cp310");
        assert_eq!(version.to_string(), "3.10");
    }

    #[test]
    fn test_python_version_rejects_garbage() {
        assert!("3".parse::<PythonVersion>().is_err());
        assert!("3.x".parse::<PythonVersion>().is_err());
        assert!("pypy3.9".parse::<PythonVersion>().is_err());
        assert!("3.10.1".parse::<PythonVersion>().is_err());
    }

    #[test]
    fn test_python_version_serde_as_string() {
        let json = serde_json::to_string(&v("3.8")).unwrap();
        assert_eq!(json, "\"3.8\"");
        let back: PythonVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("3.8"));
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("Linux".parse::<Platform>().unwrap(), Platform::Linux);
        assert_eq!("darwin".parse::<Platform>().unwrap(), Platform::MacOs);
        assert_eq!("win".parse::<Platform>().unwrap(), Platform::Windows);
        assert!("solaris".parse::<Platform>().is_err());
    }

    #[test]
    fn test_enumerate_keeps_declared_order() {
        let entries = vec![
            InterpreterEntry::new(v("3.10")),
            InterpreterEntry::new(v("3.7")),
            InterpreterEntry::new(v("3.9")),
        ];
        let cells = MatrixCell::enumerate(&entries, Platform::Linux, &BuildIdentity::numbered(1));
        let order: Vec<String> = cells.iter().map(|c| c.interpreter_version.to_string()).collect();
        assert_eq!(order, vec!["3.10", "3.7", "3.9"]);
        assert!(cells.iter().all(|c| c.eligible));
    }

    #[test]
    fn test_release_only_entry() {
        let entries = vec![InterpreterEntry::new(v("3.6")).release_only()];

        let cells = MatrixCell::enumerate(&entries, Platform::Linux, &BuildIdentity::numbered(1));
        assert!(!cells[0].eligible);
        assert_eq!(cells[0].skip_reason, Some(SkipReason::ReleaseOnly));

        let cells = MatrixCell::enumerate(&entries, Platform::Linux, &BuildIdentity::release());
        assert!(cells[0].eligible);
    }

    #[test]
    fn test_platform_excluded_entry() {
        let entries = vec![InterpreterEntry::new(v("3.8")).on([Platform::Linux, Platform::MacOs])];
        let cells = MatrixCell::enumerate(&entries, Platform::Windows, &BuildIdentity::release());
        assert_eq!(
            cells[0].skip_reason,
            Some(SkipReason::PlatformExcluded {
                platform: Platform::Windows
            })
        );
    }

    #[test]
    fn test_filtered_keeps_original_skip_reason() {
        let cell = MatrixCell::skipped(Platform::Linux, v("3.6"), SkipReason::ReleaseOnly);
        assert_eq!(cell.filtered().skip_reason, Some(SkipReason::ReleaseOnly));

        let cell = MatrixCell::eligible(Platform::Linux, v("3.9")).filtered();
        assert!(!cell.eligible);
        assert_eq!(cell.skip_reason, Some(SkipReason::Filtered));
    }

    #[test]
    fn test_cell_display() {
        let cell = MatrixCell::eligible(Platform::MacOs, v("3.11"));
        assert_eq!(cell.to_string(), "macos/py3.11");
        assert_eq!(cell.interpreter_tag(), "cp311");
    }
}
