use anyhow::{Context, Result};
use qqwry::validation::{validate_database_with_anchor, ValidationLevel, ValidationReport};
use qqwry::AreaAnchor;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub fn cmd_validate(
    database: PathBuf,
    level_str: String,
    json_output: bool,
    verbose: bool,
    area_anchor: AreaAnchor,
) -> Result<()> {
    let level = match level_str.to_lowercase().as_str() {
        "standard" => ValidationLevel::Standard,
        "strict" => ValidationLevel::Strict,
        _ => {
            anyhow::bail!(
                "Invalid validation level: '{}'. Must be: standard or strict",
                level_str
            );
        }
    };

    let start = Instant::now();
    let report = validate_database_with_anchor(&database, level, area_anchor)
        .with_context(|| format!("Validation failed: {}", database.display()))?;
    let duration = start.elapsed();

    if json_output {
        let output = json!({
            "database": database.display().to_string(),
            "validation_level": level_str,
            "is_valid": report.is_valid(),
            "duration_ms": duration.as_millis(),
            "errors": report.errors,
            "warnings": report.warnings,
            "info": report.info,
            "stats": report.stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&database, &level_str, &report, duration, verbose);
    }

    if report.is_valid() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn print_report(
    database: &Path,
    level: &str,
    report: &ValidationReport,
    duration: Duration,
    verbose: bool,
) {
    println!("{} ({} check)", database.display(), level);
    println!("  {}", report.stats.summary());
    println!("  checked in {:.2}ms", duration.as_secs_f64() * 1000.0);

    print_findings("error", &report.errors, true);
    print_findings("warning", &report.warnings, verbose);
    print_findings("info", &report.info, verbose);

    if !verbose && !report.warnings.is_empty() {
        println!("  ({} warnings hidden, rerun with --verbose)", report.warnings.len());
    }

    println!();
    if report.is_valid() {
        println!("OK: every lookup path in this file is readable");
    } else {
        println!("FAILED: {} error(s), lookups may fail", report.errors.len());
    }
}

fn print_findings(kind: &str, findings: &[String], show: bool) {
    if !show {
        return;
    }
    for finding in findings {
        println!("  {}: {}", kind, finding);
    }
}
