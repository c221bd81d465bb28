//! davcache - fetch WebDAV files and thumbnails through the local cache

use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use davcache::key::ContentMode;
use davcache::{
    Account, AccountPath, CacheConfig, CacheService, DavClient, Delivery, FetchOptions, RawBytes,
    ThumbnailKey, ThumbnailParams,
};

/// Connection details shared by the fetching commands
struct Remote {
    base_url: String,
    user: String,
    password: String,
}

/// CLI command
enum Command {
    /// Fetch a file through the cache
    Get {
        remote: Remote,
        path: String,
        output: Option<PathBuf>,
        refresh: bool,
    },
    /// Fetch a thumbnail through the cache
    Thumb {
        remote: Remote,
        path: String,
        width: u32,
        height: u32,
        fill: bool,
        output: Option<PathBuf>,
        refresh: bool,
    },
    /// Clear one account's cache, or everything
    Clear { account: Option<(String, String)> },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"davcache - Cached access to WebDAV files and thumbnails

USAGE:
    davcache get <base_url> <path> [output] [--refresh]
    davcache thumb <base_url> <path> <width> <height> [output] [--fill] [--refresh]
    davcache clear [<base_url> <user>]
    davcache help

COMMANDS:
    get     Print (or write to <output>) a file, serving it from the cache when present
    thumb   Same for a server-rendered thumbnail of <width> x <height>
    clear   Delete one account's cached files, or every cache when no account is given
    help    Show this help message

FLAGS:
    --refresh   Deliver the cached copy, then fetch again and update the cache
    --fill      Crop the thumbnail to fill the box instead of fitting inside it

EXAMPLES:
    DAV_USER=alice DAV_PASSWORD=secret davcache get https://cloud.example.com Photos/cat.jpg cat.jpg
    DAV_USER=alice DAV_PASSWORD=secret davcache thumb https://cloud.example.com Photos/cat.jpg 256 256 --fill
    davcache clear

ENVIRONMENT:
    DAV_USER         Account user name
    DAV_PASSWORD     Account password (or app token)
    DAVCACHE_DIR     Cache root (default: platform cache dir + /davcache)
    RUST_LOG         Log level (trace, debug, info, warn, error)
"#
    );
}

fn remote_from_env(base_url: &str) -> Result<Remote> {
    let user = env::var("DAV_USER").context("DAV_USER is not set")?;
    let password = env::var("DAV_PASSWORD").context("DAV_PASSWORD is not set")?;
    Ok(Remote {
        base_url: base_url.to_string(),
        user,
        password,
    })
}

fn parse_dimension(value: &str, name: &str) -> Result<u32> {
    value
        .parse()
        .with_context(|| format!("Invalid {}: {}", name, value))
}

fn parse_args() -> Result<Command> {
    let raw: Vec<String> = env::args().skip(1).collect();
    let refresh = raw.iter().any(|a| a == "--refresh");
    let fill = raw.iter().any(|a| a == "--fill");
    let args: Vec<&str> = raw
        .iter()
        .map(String::as_str)
        .filter(|a| !a.starts_with("--") || *a == "--help")
        .collect();

    let Some(command) = args.first() else {
        return Ok(Command::Help);
    };

    match *command {
        "get" => {
            if args.len() < 3 {
                return Err(anyhow!("Usage: davcache get <base_url> <path> [output]"));
            }
            Ok(Command::Get {
                remote: remote_from_env(args[1])?,
                path: args[2].to_string(),
                output: args.get(3).map(PathBuf::from),
                refresh,
            })
        }
        "thumb" => {
            if args.len() < 5 {
                return Err(anyhow!(
                    "Usage: davcache thumb <base_url> <path> <width> <height> [output]"
                ));
            }
            Ok(Command::Thumb {
                remote: remote_from_env(args[1])?,
                path: args[2].to_string(),
                width: parse_dimension(args[3], "width")?,
                height: parse_dimension(args[4], "height")?,
                fill,
                output: args.get(5).map(PathBuf::from),
                refresh,
            })
        }
        "clear" => match args.len() {
            1 => Ok(Command::Clear { account: None }),
            3 => Ok(Command::Clear {
                account: Some((args[1].to_string(), args[2].to_string())),
            }),
            _ => Err(anyhow!("Usage: davcache clear [<base_url> <user>]")),
        },
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => {
            eprintln!("Unknown command: {}", other);
            Ok(Command::Help)
        }
    }
}

fn cache_config() -> CacheConfig {
    match env::var_os("DAVCACHE_DIR") {
        Some(dir) => CacheConfig::with_root(dir),
        None => CacheConfig::default(),
    }
}

fn options(refresh: bool) -> FetchOptions {
    if refresh {
        FetchOptions::refetch()
    } else {
        FetchOptions::default()
    }
}

/// Print or save each delivered value, newest last
fn emit(delivery: Delivery<Vec<u8>>, output: Option<&PathBuf>) -> Result<()> {
    let origin = if delivery.is_fresh() { "remote" } else { "cache" };
    let bytes = delivery.into_value();

    match output {
        Some(path) => {
            fs::write(path, &bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} bytes from {} -> {}", bytes.len(), origin, path.display());
        }
        None => println!("{} bytes from {}", bytes.len(), origin),
    }
    Ok(())
}

async fn run(command: Command) -> Result<()> {
    let config = cache_config();
    let service = CacheService::open(&config, RawBytes)
        .with_context(|| format!("Failed to open cache at {}", config.root.display()))?;
    let loaded = service.load_listings();
    info!(root = %config.root.display(), listings = loaded, "Cache opened");

    match command {
        Command::Get {
            remote,
            path,
            output,
            refresh,
        } => {
            let account = Account::new(&remote.base_url, &remote.user, &remote.password);
            let key = AccountPath::new(account.id.clone(), path);
            let client = DavClient::new()?;

            let mut emitted = Ok(());
            let fetched = service
                .fetch_file(&client, &account, &key, options(refresh), |delivery| {
                    if emitted.is_ok() {
                        emitted = emit(delivery, output.as_ref());
                    }
                })
                .await;
            emitted?;
            fetched.with_context(|| format!("Failed to fetch {}", key.path()))?;
        }
        Command::Thumb {
            remote,
            path,
            width,
            height,
            fill,
            output,
            refresh,
        } => {
            let account = Account::new(&remote.base_url, &remote.user, &remote.password);
            let mode = if fill { ContentMode::Fill } else { ContentMode::Fit };
            let key = ThumbnailKey::new(
                AccountPath::new(account.id.clone(), path),
                ThumbnailParams::sized(width, height, mode),
            );
            let client = DavClient::new()?;

            let mut emitted = Ok(());
            let fetched = service
                .fetch_thumbnail(&client, &account, &key, options(refresh), |delivery| {
                    if emitted.is_ok() {
                        emitted = emit(delivery, output.as_ref());
                    }
                })
                .await;
            emitted?;
            fetched.with_context(|| format!("Failed to fetch thumbnail of {}", key.base.path()))?;
        }
        Command::Clear { account } => match account {
            Some((base_url, user)) => {
                let account = Account::new(&base_url, &user, "");
                service
                    .delete_all(&account.id)
                    .with_context(|| format!("Failed to clear cache for {}", account.id))?;
                service.listings().remove_account(&account.id);
                println!("Cleared cache for {}", account.id);
            }
            None => {
                service.clear_all();
                println!("Cleared all caches under {}", config.root.display());
            }
        },
        Command::Help => {
            print_help();
            return Ok(());
        }
    }

    service.save_listings();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = run(command).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}
