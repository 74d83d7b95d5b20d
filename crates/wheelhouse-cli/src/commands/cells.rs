//! List the matrix cells for one platform.

use anyhow::Result;
use std::path::Path;
use wheelhouse_core::MatrixCell;

use crate::TriggerArgs;

pub async fn run(config_path: &Path, trigger: &TriggerArgs, platform: Option<&str>) -> Result<()> {
    let platform = super::platform(platform)?;
    let resolved = super::resolve(config_path, trigger).await?;
    let cells = MatrixCell::enumerate(&resolved.config.interpreters, platform, &resolved.identity);

    println!("Identity: {}", resolved.identity);
    println!("Platform: {}", platform);
    println!();
    for cell in &cells {
        println!("{}", describe(cell));
    }
    Ok(())
}

fn describe(cell: &MatrixCell) -> String {
    match &cell.skip_reason {
        None => format!("  ✓ {} ({})", cell, cell.interpreter_tag()),
        Some(reason) => format!("  ⊘ {} - {}", cell, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelhouse_core::{Platform, PythonVersion, SkipReason};

    #[test]
    fn test_describe() {
        let eligible = MatrixCell::eligible(Platform::Linux, PythonVersion::new(3, 10));
        assert_eq!(describe(&eligible), "  ✓ linux/py3.10 (cp310)");

        let skipped = MatrixCell::skipped(
            Platform::Linux,
            PythonVersion::new(3, 6),
            SkipReason::ReleaseOnly,
        );
        assert_eq!(describe(&skipped), "  ⊘ linux/py3.6 - only built for releases");
    }
}
