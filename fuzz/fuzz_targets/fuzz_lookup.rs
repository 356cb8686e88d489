#![no_main]
use libfuzzer_sys::fuzz_target;
use qqwry::{Database, QqwryBuilder};
use std::sync::OnceLock;

// Built once; the fuzzer only varies the query text
static DB: OnceLock<Database> = OnceLock::new();

fn db() -> &'static Database {
    DB.get_or_init(|| {
        let mut builder = QqwryBuilder::new();
        let ranges = [
            ("0.0.0.0", "0.255.255.255", "IANA", "保留地址"),
            ("1.0.0.0", "1.0.0.255", "澳大利亚", "CZ88.NET"),
            ("1.0.1.0", "1.0.3.255", "福建省", "电信"),
            ("10.0.0.0", "10.255.255.255", "局域网", "对方和您在同一内部网"),
            ("127.0.0.0", "127.255.255.255", "本机地址", ""),
            ("192.168.0.0", "192.168.255.255", "局域网", "对方和您在同一内部网"),
            ("255.255.255.0", "255.255.255.255", "纯真网络", "IP数据"),
        ];
        for (start, end, country, area) in ranges {
            builder.add_range(start, end, country, area).unwrap();
        }
        Database::from_bytes(builder.build().unwrap()).unwrap()
    })
}

fuzz_target!(|data: &[u8]| {
    if let Ok(query) = std::str::from_utf8(data) {
        let _ = db().lookup(query);
    }
});
