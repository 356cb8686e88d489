use anyhow::{Context, Result};
use qqwry::{AreaAnchor, Database};
use serde_json::json;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::cli_utils::{codec_for, format_bytes, format_number};

pub fn cmd_inspect(
    database: PathBuf,
    json_output: bool,
    verbose: bool,
    encoding: String,
    area_anchor: AreaAnchor,
) -> Result<()> {
    let db = Database::from(&database)
        .codec(codec_for(&encoding)?)
        .area_anchor(area_anchor)
        .no_cache()
        .open()
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let entry_count = db.entry_count();
    let mut buckets: Vec<(u8, usize)> = (0..=255u8)
        .filter_map(|octet| db.bucket(octet).map(|b| (octet, b.len())))
        .collect();
    let populated = buckets.len();

    // Published files close with a pseudo-entry whose strings carry the release
    let last = entry_count - 1;
    let version = db.resolve(last).ok().map(|record| {
        (
            db.decode_text(&record.country).into_owned(),
            db.decode_text(&record.area).into_owned(),
        )
    });
    let (first_ip, _) = db.entry_range(0).unwrap_or((Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED));
    let last_ip = db
        .entry_range(last)
        .map(|(_, end)| end)
        .unwrap_or(Ipv4Addr::UNSPECIFIED);

    buckets.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    if json_output {
        let mut output = json!({
            "file": database.display().to_string(),
            "file_size": db.len(),
            "entry_count": entry_count,
            "index_start": db.index_start(),
            "index_end": db.index_end(),
            "populated_octets": populated,
            "first_address": first_ip.to_string(),
            "last_address": last_ip.to_string(),
            "encoding": db.encoding_name(),
            "exceeds_pointer_range": db.exceeds_pointer_range(),
        });
        if let Some((country, area)) = &version {
            output["last_record"] = json!({ "country": country, "area": area });
        }
        if verbose {
            output["buckets"] = json!(buckets
                .iter()
                .map(|(octet, len)| json!({ "octet": octet, "entries": len }))
                .collect::<Vec<_>>());
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database: {}", database.display());
    println!("Size:     {}", format_bytes(db.len()));
    println!("Encoding: {}", db.encoding_name());
    println!();
    println!("Index:");
    println!("  Entries:         {}", format_number(entry_count));
    println!("  Region:          [{}, {}]", db.index_start(), db.index_end());
    println!("  Populated octets: {}/256", populated);
    println!("  Address span:    {} - {}", first_ip, last_ip);
    if db.exceeds_pointer_range() {
        println!("  ⚠️  Detail region exceeds the 24-bit pointer range");
    }

    if let Some((country, area)) = &version {
        println!();
        println!("Last record:");
        println!("  {} {}", country, area);
    }

    if verbose {
        println!();
        println!("Largest buckets:");
        for (octet, len) in buckets.iter().take(10) {
            println!("  {:>3}.x.x.x  {:>10} entries", octet, format_number(*len));
        }
    }

    Ok(())
}
