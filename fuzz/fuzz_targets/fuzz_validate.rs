#![no_main]
use libfuzzer_sys::fuzz_target;
use qqwry::{validate_bytes, ValidationLevel};

fuzz_target!(|data: &[u8]| {
    // The validator walks every record of untrusted input
    let _ = validate_bytes(data, ValidationLevel::Strict);
});
