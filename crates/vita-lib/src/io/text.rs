//! Newline-delimited RR interval files, `#` comments allowed.

use anyhow::{Context, Result};
use std::path::Path;

/// Parse newline-delimited floating point series, ignoring blank/comment lines.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not f64: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Parse RR intervals (ms), one per line. Non-positive intervals are rejected.
pub fn parse_rr_intervals(text: &str) -> Result<Vec<f64>> {
    let rr = parse_f64_series(text)?;
    if let Some(bad) = rr.iter().find(|v| !v.is_finite() || **v <= 0.0) {
        anyhow::bail!("RR interval must be positive, got {bad}");
    }
    Ok(rr)
}

pub fn read_rr_intervals(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_rr_intervals(&text).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blanks() {
        let parsed = parse_f64_series("# ppg\n1.5\n\n  2.0 \n# end\n-3\n").unwrap();
        assert_eq!(parsed, vec![1.5, 2.0, -3.0]);
    }

    #[test]
    fn reports_offending_line() {
        let err = parse_f64_series("1.0\nabc\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
        assert!(parse_f64_series("# only a comment\n").is_err());
    }

    #[test]
    fn rr_intervals_must_be_positive() {
        assert_eq!(parse_rr_intervals("800\n810\n").unwrap(), vec![800.0, 810.0]);
        assert!(parse_rr_intervals("800\n0\n").is_err());
    }

    #[test]
    fn reads_rr_fixture() {
        let manifest_dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let path = manifest_dir
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace")
            .join("test_data/rr_intervals.txt");
        let rr = read_rr_intervals(&path).unwrap();
        assert_eq!(rr.len(), 12);
        assert!(rr.iter().all(|v| (700.0..=900.0).contains(v)));
    }

    #[test]
    fn rr_file_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rr.txt");
        std::fs::write(&path, "800
-5
").unwrap();
        let err = read_rr_intervals(&path).unwrap_err();
        assert!(format!("{err:#}").contains("rr.txt"));
        assert!(read_rr_intervals(&dir.path().join("missing.txt")).is_err());
    }
}
