use anyhow::{Context, Result};
use qqwry::QqwryBuilder;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use crate::cli_utils::{codec_for, format_bytes, format_number};

pub fn cmd_build(
    input: PathBuf,
    output: PathBuf,
    encoding: String,
    has_header: bool,
) -> Result<()> {
    let start = Instant::now();
    let mut builder = QqwryBuilder::new().with_codec(codec_for(&encoding)?);

    let file = fs::File::open(&input)
        .with_context(|| format!("Failed to open CSV file: {}", input.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(file);

    // Rows: start,end,country[,area]
    for (row, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read CSV row {}", row + 1))?;
        if record.len() < 3 {
            anyhow::bail!(
                "CSV row {} has {} column(s); expected start,end,country[,area]",
                row + 1,
                record.len()
            );
        }
        builder
            .add_range(&record[0], &record[1], &record[2], record.get(3).unwrap_or(""))
            .with_context(|| format!("Invalid range on CSV row {}", row + 1))?;
    }

    let range_count = builder.len();
    let bytes = builder.build().context("Failed to build database")?;
    fs::write(&output, &bytes)
        .with_context(|| format!("Failed to write database: {}", output.display()))?;

    println!("✓ Database built: {}", output.display());
    println!("  Ranges:     {}", format_number(range_count));
    println!("  Size:       {}", format_bytes(bytes.len()));
    println!("  Encoding:   {}", encoding);
    println!("  Build time: {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}
