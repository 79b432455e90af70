use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Parse one `f64` per line. Blank lines and `#` comments are skipped.
pub fn parse_samples(text: &str) -> Result<Vec<f64>> {
    let mut samples = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let value: f64 = trimmed
            .parse()
            .with_context(|| format!("line {}: not a number: {trimmed}", idx + 1))?;
        if !value.is_finite() {
            bail!("line {}: non-finite sample {trimmed}", idx + 1);
        }
        samples.push(value);
    }
    if samples.is_empty() {
        bail!("no samples found");
    }
    Ok(samples)
}

pub fn read_samples(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_samples(&text).with_context(|| format!("in {}", path.display()))
}

/// One sample per line, optionally preceded by a `#` header line.
pub fn format_samples(samples: &[f64], header: Option<&str>) -> String {
    let mut out = String::with_capacity(samples.len() * 12);
    if let Some(header) = header {
        let _ = writeln!(out, "# {header}");
    }
    for v in samples {
        let _ = writeln!(out, "{v}");
    }
    out
}

pub fn write_samples(path: &Path, samples: &[f64], header: Option<&str>) -> Result<()> {
    fs::write(path, format_samples(samples, header))
        .with_context(|| format!("failed to write {}", path.display()))
}
