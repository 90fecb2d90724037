//! trust-cache: 报告缓存维护命令行工具
//!
//! Usage:
//!   trust-cache normalize <query>                  Print the normalized query
//!   trust-cache key <query> [--lang <tag>]         Print composite and hashed keys
//!   trust-cache get <query> [--lang <tag>]         Look up a cached report
//!   trust-cache stats                              Entry counts for the configured store
//!   trust-cache sweep                              Remove expired entries
//!   trust-cache clear                              Remove every entry

use anyhow::{bail, Context};
use std::path::PathBuf;
use trust_cache::cache::{normalize, CacheKey, ReportCache};
use trust_cache::config::TrustCacheConfig;

#[tokio::main]
async fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "normalize" => cmd_normalize(&args[2..]),
        "key" => cmd_key(&args[2..]),
        "get" => cmd_get(&args[2..]).await,
        "stats" => cmd_stats(&args[2..]).await,
        "sweep" => cmd_sweep(&args[2..]).await,
        "clear" => cmd_clear(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("trust-cache {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!(
        r#"trust-cache: report cache maintenance

USAGE:
    trust-cache <COMMAND> [OPTIONS]

COMMANDS:
    normalize <query>               Print the normalized form of a query
    key <query> [--lang <tag>]      Print the composite and hashed cache keys
    get <query> [--lang <tag>]      Print a cached report, if present
    stats                           Show total / expired / valid entries
    sweep                           Remove expired entries
    clear                           Remove every entry
    version                         Show version information
    help                            Show this help message

OPTIONS:
    --config <path>                 YAML configuration file
    --lang <tag>                    Language tag (default: en)

ENVIRONMENT:
    TRUST_CACHE_CONFIG              Configuration file when --config is absent
    TRUST_CACHE_BACKEND             file | profile | remote | none
    TRUST_CACHE_FILE                File store path
    TRUST_CACHE_REMOTE_URL          Document service base URL
    RUST_LOG                        Log filter (default: info)"#
    );
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// First argument that is neither a flag nor a flag's value.
fn positional(args: &[String]) -> Option<&str> {
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
            continue;
        }
        if arg.starts_with("--") {
            skip = true;
            continue;
        }
        return Some(arg);
    }
    None
}

fn query_arg(args: &[String]) -> anyhow::Result<&str> {
    match positional(args) {
        Some(q) => Ok(q),
        None => bail!("missing <query> argument"),
    }
}

fn load_config(args: &[String]) -> anyhow::Result<TrustCacheConfig> {
    let path = flag_value(args, "--config")
        .map(PathBuf::from)
        .or_else(|| std::env::var("TRUST_CACHE_CONFIG").ok().map(PathBuf::from));
    let config = match path {
        Some(path) => TrustCacheConfig::from_yaml_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TrustCacheConfig::default(),
    };
    Ok(config.apply_env()?)
}

async fn open_cache(args: &[String]) -> anyhow::Result<ReportCache> {
    let config = load_config(args)?;
    let store = config.build_store().await.context("opening cache store")?;
    Ok(ReportCache::new(config.cache_config(), store))
}

fn cmd_normalize(args: &[String]) -> anyhow::Result<()> {
    println!("{}", normalize(query_arg(args)?));
    Ok(())
}

fn cmd_key(args: &[String]) -> anyhow::Result<()> {
    let query = query_arg(args)?;
    let lang = flag_value(args, "--lang").unwrap_or("en");
    let normalized = normalize(query);
    println!("normalized: {normalized}");
    println!("composite:  {}", CacheKey::composite(&normalized, lang));
    println!("hashed:     {}", CacheKey::hashed(&normalized, lang));
    Ok(())
}

async fn cmd_get(args: &[String]) -> anyhow::Result<()> {
    let query = query_arg(args)?;
    let lang = flag_value(args, "--lang").unwrap_or("en");
    let cache = open_cache(args).await?;
    match cache.lookup(query, lang, None).await {
        Some(report) => println!("{report}"),
        None => {
            eprintln!("no live entry for {:?} ({lang})", normalize(query));
            std::process::exit(2);
        }
    }
    Ok(())
}

async fn cmd_stats(args: &[String]) -> anyhow::Result<()> {
    let cache = open_cache(args).await?;
    let stats = cache.store_stats().await?;
    println!("backend: {}", cache.backend_name());
    println!("total:   {}", stats.total);
    println!("expired: {}", stats.expired);
    println!("valid:   {}", stats.valid);
    Ok(())
}

async fn cmd_sweep(args: &[String]) -> anyhow::Result<()> {
    let cache = open_cache(args).await?;
    let removed = cache.sweep().await?;
    println!("removed {removed} expired entries from {}", cache.backend_name());
    Ok(())
}

async fn cmd_clear(args: &[String]) -> anyhow::Result<()> {
    let cache = open_cache(args).await?;
    let removed = cache.clear_all().await?;
    println!("removed {removed} entries from {}", cache.backend_name());
    Ok(())
}
