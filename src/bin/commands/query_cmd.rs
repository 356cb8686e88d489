use anyhow::{Context, Result};
use qqwry::{parse_ipv4, AreaAnchor, Database};
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{codec_for, format_hex};

pub fn cmd_query(
    database: PathBuf,
    addresses: Vec<String>,
    json_output: bool,
    raw: bool,
    encoding: String,
    area_anchor: AreaAnchor,
) -> Result<()> {
    let db = Database::from(&database)
        .codec(codec_for(&encoding)?)
        .area_anchor(area_anchor)
        .open()
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let mut results = Vec::with_capacity(addresses.len());
    let mut all_found = true;

    for address in &addresses {
        let ip = parse_ipv4(address).with_context(|| format!("Query failed for: {}", address))?;
        let Some(position) = db.locate(ip) else {
            all_found = false;
            results.push(json!({ "address": address, "found": false }));
            if !json_output {
                println!("{}\tnot found", address);
            }
            continue;
        };

        let record = db
            .resolve(position)
            .with_context(|| format!("Failed to decode record for: {}", address))?;
        let (start, end) = db
            .entry_range(position)
            .with_context(|| format!("Failed to read range for: {}", address))?;

        if json_output {
            let mut entry = json!({
                "address": address,
                "found": true,
                "country": db.decode_text(&record.country),
                "area": db.decode_text(&record.area),
                "range_start": start.to_string(),
                "range_end": end.to_string(),
                "index": position,
            });
            if raw {
                entry["country_hex"] = json!(format_hex(&record.country));
                entry["area_hex"] = json!(format_hex(&record.area));
            }
            results.push(entry);
        } else if raw {
            println!(
                "{}\t[{}]\t[{}]",
                address,
                format_hex(&record.country),
                format_hex(&record.area)
            );
        } else {
            println!(
                "{}\t{} {}\t({} - {})",
                address,
                db.decode_text(&record.country),
                db.decode_text(&record.area),
                start,
                end
            );
        }
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&json!(results))?);
    }

    // Exit code 1 if any address had no entry
    if all_found {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
