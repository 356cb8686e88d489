// Logging setup for the CLI
use std::io::Write;

/// Initialize env_logger; `RUST_LOG` overrides the flags entirely
pub fn init_logger(debug: bool, quiet: bool) {
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
        return;
    }

    let default_level = if quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Warn
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(default_level).format(|buf, record| {
        if record.level() <= log::Level::Warn {
            writeln!(buf, "{}: {}", record.level().as_str().to_lowercase(), record.args())
        } else {
            writeln!(buf, "[{}] {}", record.level(), record.args())
        }
    });

    if debug {
        builder.filter_module("qqwry", log::LevelFilter::Debug);
    }

    builder.init();
}
