#![no_main]
use libfuzzer_sys::fuzz_target;
use std::net::Ipv4Addr;

fuzz_target!(|data: &[u8]| {
    // Loading and querying garbage must never panic
    if let Ok(db) = qqwry::Database::from_bytes(data.to_vec()) {
        for probe in [0u32, 0x0100_0000, 0x7F00_0001, 0xC0A8_0101, u32::MAX] {
            let _ = db.lookup_ip(Ipv4Addr::from(probe));
        }
        for entry in db.entries().iter().take(64) {
            let _ = db.lookup_ip(Ipv4Addr::from(entry.ip));
        }
    }
});
