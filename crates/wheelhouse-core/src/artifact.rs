//! Artifact naming.
//!
//! Built artifacts are named `<package>-<version>-<interpreter-tag>-<platform-tag>.<ext>`.
//! The interpreter tag is what ties an artifact to a matrix cell.

use serde::{Deserialize, Serialize};

/// A parsed artifact file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactName {
    pub package: String,
    pub version: String,
    pub interpreter_tag: String,
    /// Everything after the interpreter tag (ABI and platform tags).
    pub platform_tag: String,
    pub ext: String,
}

impl ArtifactName {
    /// Parse a file name. Returns `None` when it does not follow the naming
    /// convention.
    pub fn parse(file_name: &str) -> Option<Self> {
        let (stem, ext) = file_name.rsplit_once('.')?;
        let mut parts = stem.splitn(4, '-');
        let package = parts.next()?;
        let version = parts.next()?;
        let interpreter_tag = parts.next()?;
        let platform_tag = parts.next()?;

        if [package, version, interpreter_tag, platform_tag, ext]
            .iter()
            .any(|p| p.is_empty())
        {
            return None;
        }

        Some(Self {
            package: package.to_string(),
            version: version.to_string(),
            interpreter_tag: interpreter_tag.to_string(),
            platform_tag: platform_tag.to_string(),
            ext: ext.to_string(),
        })
    }

    /// Whether this artifact belongs to `package` and carries exactly
    /// `interpreter_tag`.
    pub fn matches(&self, package: &str, interpreter_tag: &str, ext: &str) -> bool {
        normalize_package(&self.package) == normalize_package(package)
            && self.interpreter_tag == interpreter_tag
            && self.ext.eq_ignore_ascii_case(ext)
    }

    /// Glob pattern (relative to the output directory) for candidate files.
    pub fn pattern(package: &str, interpreter_tag: &str, ext: &str) -> String {
        format!(
            "{}-*-{}-*.{}",
            normalize_package(package),
            interpreter_tag,
            ext
        )
    }
}

/// Artifact names replace `-` in the package name with `_`.
pub fn normalize_package(package: &str) -> String {
    package.replace(['-', '.'], "_").to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wheel_name() {
        let name =
            ArtifactName::parse("datatable-1.1.0.dev42-cp310-cp310-manylinux_2_17_x86_64.whl")
                .unwrap();
        assert_eq!(name.package, "datatable");
        assert_eq!(name.version, "1.1.0.dev42");
        assert_eq!(name.interpreter_tag, "cp310");
        assert_eq!(name.platform_tag, "cp310-manylinux_2_17_x86_64");
        assert_eq!(name.ext, "whl");
    }

    #[test]
    fn test_parse_rejects_short_names() {
        assert!(ArtifactName::parse("datatable-1.0.tar.gz").is_none());
        assert!(ArtifactName::parse("README").is_none());
        assert!(ArtifactName::parse("a--cp39-x.whl").is_none());
    }

    #[test]
    fn test_interpreter_tag_matched_exactly() {
        let name = ArtifactName::parse("datatable-1.0-cp310-cp310-win_amd64.whl").unwrap();
        assert!(name.matches("datatable", "cp310", "whl"));
        assert!(!name.matches("datatable", "cp31", "whl"));
        assert!(!name.matches("datatable", "cp3100", "whl"));
        assert!(!name.matches("other", "cp310", "whl"));
    }

    #[test]
    fn test_package_normalization() {
        let name = ArtifactName::parse("my_pkg-0.1-cp39-cp39-linux_x86_64.whl").unwrap();
        assert!(name.matches("my-pkg", "cp39", "whl"));
        assert_eq!(ArtifactName::pattern("my-pkg", "cp39", "whl"), "my_pkg-*-cp39-*.whl");
    }
}
