mod cli_utils;
mod commands;
mod logger;

use anyhow::Result;
use clap::{Parser, Subcommand};
use qqwry::AreaAnchor;
use std::path::PathBuf;

use commands::{cmd_bench, cmd_build, cmd_inspect, cmd_query, cmd_validate};

#[derive(Parser)]
#[command(name = "qqwry")]
#[command(
    about = "Query, inspect, validate and build QQWry IPv4 location databases",
    long_about = "qqwry - Reader and builder for QQWry (纯真 IP 库) IPv4 location databases\n\n\
    Looks up the country and area of IPv4 addresses in a qqwry.dat file. The file is\n\
    memory-mapped and indexed once at load; lookups are a bucketed binary search.\n\n\
    Examples:\n\
      qqwry query qqwry.dat 114.114.114.114 8.8.8.8\n\
      qqwry query qqwry.dat 1.2.3.4 --json\n\
      qqwry inspect qqwry.dat\n\
      qqwry validate qqwry.dat --level strict\n\
      qqwry query old.dat 1.2.3.4 --area-anchor target\n\
      qqwry build ranges.csv -o custom.dat"
)]
#[command(version)]
struct Cli {
    /// Show debug logging from the library
    #[arg(long, global = true, conflicts_with = "quiet")]
    debug: bool,

    /// Only log errors
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one or more IPv4 addresses
    Query {
        /// Path to the database (qqwry.dat)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Addresses to look up (dotted quad, or IPv4-mapped IPv6)
        #[arg(value_name = "ADDRESS", required = true)]
        addresses: Vec<String>,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,

        /// Show raw record bytes as hex instead of decoded text
        #[arg(long)]
        raw: bool,

        /// Text encoding of the database strings (WHATWG label)
        #[arg(short, long, default_value = "gbk")]
        encoding: String,

        /// Where chained records keep their area field: record or target
        #[arg(long, value_name = "ANCHOR", default_value = "record")]
        area_anchor: AreaAnchor,
    },

    /// Show database layout and statistics
    Inspect {
        /// Path to the database (qqwry.dat)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output metadata as JSON
        #[arg(short, long)]
        json: bool,

        /// Show per-octet bucket statistics
        #[arg(short, long)]
        verbose: bool,

        /// Text encoding of the database strings (WHATWG label)
        #[arg(short, long, default_value = "gbk")]
        encoding: String,

        /// Where chained records keep their area field: record or target
        #[arg(long, value_name = "ANCHOR", default_value = "record")]
        area_anchor: AreaAnchor,
    },

    /// Validate a database file for safety and correctness
    Validate {
        /// Path to the database (qqwry.dat)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Validation level: standard or strict (default)
        #[arg(short, long, default_value = "strict")]
        level: String,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,

        /// Show detailed information (warnings and info messages)
        #[arg(short, long)]
        verbose: bool,

        /// Where chained records keep their area field: record or target
        #[arg(long, value_name = "ANCHOR", default_value = "record")]
        area_anchor: AreaAnchor,
    },

    /// Build a database from a CSV file of ranges
    Build {
        /// CSV input with rows: start,end,country[,area]
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output database file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Text encoding used for the written strings (WHATWG label)
        #[arg(short, long, default_value = "gbk")]
        encoding: String,

        /// Treat the first CSV row as a header
        #[arg(long)]
        has_header: bool,
    },

    /// Benchmark load time and lookup throughput against a database
    Bench {
        /// Path to the database (qqwry.dat)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Number of lookups to run
        #[arg(short = 'n', long, default_value = "1000000")]
        query_count: usize,

        /// Number of load iterations to average
        #[arg(long, default_value = "3")]
        load_iterations: usize,

        /// LRU cache capacity (0 disables caching, omit for a slot per entry)
        #[arg(long)]
        cache_size: Option<usize>,

        /// Simulated cache hit rate percentage (0-100)
        #[arg(long, default_value = "0")]
        cache_hit_rate: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_logger(cli.debug, cli.quiet);

    match cli.command {
        Commands::Query {
            database,
            addresses,
            json,
            raw,
            encoding,
            area_anchor,
        } => cmd_query(database, addresses, json, raw, encoding, area_anchor),
        Commands::Inspect {
            database,
            json,
            verbose,
            encoding,
            area_anchor,
        } => cmd_inspect(database, json, verbose, encoding, area_anchor),
        Commands::Validate {
            database,
            level,
            json,
            verbose,
            area_anchor,
        } => cmd_validate(database, level, json, verbose, area_anchor),
        Commands::Build {
            input,
            output,
            encoding,
            has_header,
        } => cmd_build(input, output, encoding, has_header),
        Commands::Bench {
            database,
            query_count,
            load_iterations,
            cache_size,
            cache_hit_rate,
        } => cmd_bench(
            database,
            query_count,
            load_iterations,
            cache_size,
            cache_hit_rate,
        ),
    }
}
