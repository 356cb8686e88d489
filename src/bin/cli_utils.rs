use anyhow::{anyhow, Result};
use qqwry::EncodingCodec;

/// Group digits in threes: `1234567` -> `1,234,567`
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    out.push_str(&digits[..head]);
    for group in digits.as_bytes()[head..].chunks(3) {
        if !out.is_empty() {
            out.push(',');
        }
        out.extend(group.iter().map(|&b| b as char));
    }
    out
}

/// Binary-prefixed size, e.g. `10.62 MiB` for a typical qqwry.dat
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Lookup rate with an SI suffix
pub fn format_qps(qps: f64) -> String {
    match qps {
        q if q >= 1e6 => format!("{:.2}M", q / 1e6),
        q if q >= 1e3 => format!("{:.1}k", q / 1e3),
        q => format!("{:.0}", q),
    }
}

/// Space-separated lowercase hex, e.g. `b1 b1 be a9`
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve an `--encoding` argument
pub fn codec_for(label: &str) -> Result<EncodingCodec> {
    EncodingCodec::for_label(label).ok_or_else(|| anyhow!("Unknown encoding: '{}'", label))
}
