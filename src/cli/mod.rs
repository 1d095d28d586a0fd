//! CLI mode for clarity-cache: drives the lifecycle handlers from the command line.

use std::path::PathBuf;

use crate::{
    AppConfig, AssetCacheManager, CacheConfig, CacheStorage, DiskStorage, Error, HttpNetwork,
    Request, Result, format_bytes, format_duration,
};

/// Usage text printed for `-h`/`--help` and on argument errors.
pub const USAGE: &str = "\
Usage: clarity-cache [OPTIONS] <COMMAND>

Commands:
  install             Precache every asset into the current store
  activate            Delete stores left behind by older versions
  caches              List cache stores
  fetch <url>         Answer one request cache-first and report its source
  serve               Install, activate, then serve requests over HTTP

Options:
  --config <PATH>     Config file (default: ~/.config/clarity-cache/config.toml)
  --origin <URL>      Origin for live fetches (default: http://127.0.0.1:5000)
  --store-dir <DIR>   Directory holding cache stores
  --host <HOST>       Bind address for serve (default: 127.0.0.1)
  --port <PORT>       Bind port for serve (default: 9724)
  -h, --help          Show this help";

/// A lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the install handler.
    Install,
    /// Run the activate handler.
    Activate,
    /// List store names.
    Caches,
    /// Run the fetch handler for one URL.
    Fetch(String),
    /// Install, activate, and serve over HTTP.
    Serve,
    /// Print usage.
    Help,
}

/// Parsed command-line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    /// Command to run.
    pub command: Command,
    /// Explicit config file path.
    pub config_path: Option<PathBuf>,
    /// Origin override.
    pub origin: Option<String>,
    /// Store directory override.
    pub store_dir: Option<PathBuf>,
    /// Bind host override.
    pub host: Option<String>,
    /// Bind port override.
    pub port: Option<u16>,
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::Usage(msg.into())
}

/// Parses arguments (without the program name).
///
/// # Errors
///
/// Returns [`Error::Usage`] for unknown flags, missing values, or a
/// missing or unknown command.
pub fn parse_args(args: &[String]) -> Result<CliOptions> {
    let mut command = None;
    let mut config_path = None;
    let mut origin = None;
    let mut store_dir = None;
    let mut host = None;
    let mut port = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| invalid(format!("{flag} requires a value")))
        };
        match arg.as_str() {
            "-h" | "--help" => command = Some(Command::Help),
            "--config" => config_path = Some(PathBuf::from(value("--config")?)),
            "--origin" => origin = Some(value("--origin")?),
            "--store-dir" => store_dir = Some(PathBuf::from(value("--store-dir")?)),
            "--host" => host = Some(value("--host")?),
            "--port" => {
                let raw = value("--port")?;
                port = Some(
                    raw.parse::<u16>()
                        .map_err(|e| invalid(format!("invalid --port {raw}: {e}")))?,
                );
            }
            flag if flag.starts_with('-') => return Err(invalid(format!("unknown option {flag}"))),
            _ if command.is_some() => {
                // Help already chosen or a command already given
                if command == Some(Command::Help) {
                    continue;
                }
                return Err(invalid(format!("unexpected argument {arg}")));
            }
            "install" => command = Some(Command::Install),
            "activate" => command = Some(Command::Activate),
            "caches" => command = Some(Command::Caches),
            "serve" => command = Some(Command::Serve),
            "fetch" => command = Some(Command::Fetch(value("fetch")?)),
            other => return Err(invalid(format!("unknown command {other}"))),
        }
    }

    Ok(CliOptions {
        command: command.unwrap_or(Command::Help),
        config_path,
        origin,
        store_dir,
        host,
        port,
    })
}

impl CliOptions {
    /// Loads the config file and applies command-line overrides.
    ///
    /// An explicit `--config` is created with defaults if missing; the
    /// default location is only read when it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, written or parsed.
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config_path {
            Some(path) => AppConfig::load_or_create(path)?,
            None => {
                let path = AppConfig::default_path();
                if path.exists() {
                    log::debug!("Loading config from {}", path.display());
                    AppConfig::load(&path)?
                } else {
                    AppConfig::default()
                }
            }
        };

        if let Some(origin) = &self.origin {
            config.network.origin.clone_from(origin);
        }
        if let Some(dir) = &self.store_dir {
            config.paths.store_dir.clone_from(dir);
        }
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        Ok(config)
    }
}

/// Builds the manager used by every command.
fn build_manager(config: &AppConfig) -> Result<AssetCacheManager> {
    let storage = DiskStorage::new(&config.paths.store_dir);
    let network = HttpNetwork::new(&config.network)?;
    let cache = CacheConfig::new().with_origin(config.network.origin.as_str());
    Ok(AssetCacheManager::with_config(storage, network, cache))
}

async fn install(manager: &AssetCacheManager) -> Result<()> {
    let stats = manager.install().await?;
    println!(
        "Installed {} asset(s) into {} ({} in {}, {}/s)",
        stats.assets,
        stats.cache_name,
        format_bytes(stats.total_bytes),
        format_duration(stats.elapsed),
        format_bytes(stats.average_speed())
    );
    Ok(())
}

async fn activate(manager: &AssetCacheManager) -> Result<()> {
    let stats = manager.activate().await?;
    for name in &stats.deleted {
        println!("  deleted {name}");
    }
    for (name, reason) in &stats.failed {
        println!("  FAILED  {name}: {reason}");
    }
    println!(
        "Activated {} ({} stale cache(s) deleted)",
        manager.config().cache_name,
        stats.deleted.len()
    );
    Ok(())
}

async fn list_caches(manager: &AssetCacheManager) -> Result<()> {
    let names = manager.storage().keys().await?;
    if names.is_empty() {
        println!("No cache stores in {}", manager.storage().dir().display());
        return Ok(());
    }
    for name in names {
        let marker = if name == manager.config().cache_name { '*' } else { ' ' };
        let count = manager.storage().entries(&name).await?.len();
        println!("{marker} {name} ({count} entries)");
    }
    Ok(())
}

async fn fetch(manager: &AssetCacheManager, url: &str) -> Result<()> {
    let served = manager.handle_fetch(&Request::get(url)).await?;
    println!(
        "{} {url} via {} ({}, {})",
        served.response.status,
        served.source,
        served.response.header("content-type").unwrap_or("unknown type"),
        format_bytes(served.response.len())
    );
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(manager: AssetCacheManager, config: &AppConfig) -> Result<()> {
    // The host never hands control to a version whose install failed
    install(&manager).await?;
    activate(&manager).await?;

    let manager = std::sync::Arc::new(manager);
    let snapshot =
        crate::server::run_server(manager, &config.server.host, config.server.port).await?;
    println!(
        "Served {} request(s): {} cache, {} network, {} fallback, {} offline",
        snapshot.total(),
        snapshot.cache,
        snapshot.network,
        snapshot.fallback,
        snapshot.offline
    );
    Ok(())
}

/// Runs the CLI with the given arguments (without the program name).
///
/// # Errors
///
/// Returns an error if argument parsing, configuration, or the chosen
/// lifecycle handler fails.
pub async fn run(args: &[String]) -> Result<()> {
    let options = parse_args(args)?;
    if options.command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = options.load_config()?;
    log::debug!(
        "Origin {}, stores in {}",
        config.network.origin,
        config.paths.store_dir.display()
    );
    let manager = build_manager(&config)?;

    match options.command {
        Command::Install => install(&manager).await,
        Command::Activate => activate(&manager).await,
        Command::Caches => list_caches(&manager).await,
        Command::Fetch(url) => fetch(&manager, &url).await,
        #[cfg(feature = "server")]
        Command::Serve => serve(manager, &config).await,
        #[cfg(not(feature = "server"))]
        Command::Serve => Err(invalid("serve requires the 'server' feature")),
        Command::Help => Ok(()),
    }
}
