//! Binary entrypoint for the Tradehall daemon.
//!
//! Commands:
//! - `start` - open the market store, seed the system vendor, and run the
//!   periodic sales sweep until Ctrl-C
//! - `init` - create a starter `config.toml`
//! - `status` - print a brief summary of the store
//!
//! See the library crate docs for module-level details: `tradehall::`.
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{debug, info, warn};

use tradehall::config::Config;
use tradehall::market::{MarketEngine, MarketStore, DEMAND_WINDOW_HOURS};

#[derive(Parser)]
#[command(name = "tradehall")]
#[command(about = "Market and dynamic economy engine for multiplayer tycoon games")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the market daemon
    Start,
    /// Initialize a new configuration file
    Init,
    /// Show store status and statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config early to configure logging (except for Init which writes
    // the default file later).
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    if !matches!(cli.command, Commands::Init) {
        init_logging(&pre_config, cli.verbose);
    }

    match cli.command {
        Commands::Start => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            info!("Starting Tradehall v{}", env!("CARGO_PKG_VERSION"));
            run_daemon(config).await
        }
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            println!("Wrote starter configuration to {}", cli.config);
            println!("Review the [economy] section before first start.");
            Ok(())
        }
        Commands::Status => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            print_status(&config)
        }
    }
}

async fn run_daemon(config: Config) -> Result<()> {
    let store = Arc::new(MarketStore::open(&config.engine.data_dir)?);
    let engine = Arc::new(MarketEngine::new(
        store,
        config.economy.clone(),
        config.engine.system_account.clone(),
    ));

    let seeded = engine.seed_system_market()?;
    if seeded > 0 {
        info!(
            "seeded system vendor '{}' with {} baseline listings",
            config.engine.system_account, seeded
        );
    }

    // Mirror the event feed into the debug log as JSON lines; a UI bridge
    // would subscribe the same way.
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        debug!("market event: {}", json);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("event log fell behind, skipped {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(config.engine.sweep_interval_secs));
    info!(
        "sales sweep every {}s, data dir {}",
        config.engine.sweep_interval_secs, config.engine.data_dir
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let engine = engine.clone();
                // Store access is synchronous; keep it off the runtime
                // worker threads.
                match tokio::task::spawn_blocking(move || engine.run_sales_sweep()).await {
                    Ok(Ok(0)) => {}
                    Ok(Ok(processed)) => info!("sales sweep settled {} shops", processed),
                    Ok(Err(err)) => warn!("sales sweep failed: {}", err),
                    Err(err) => warn!("sales sweep task failed: {}", err),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn print_status(config: &Config) -> Result<()> {
    let store = MarketStore::open(&config.engine.data_dir)?;

    let accounts = store.list_account_ids()?.len();
    let listings = store.all_listings()?;
    let active = listings.iter().filter(|l| l.active).count();
    let shops = store.list_shops()?;
    let selling = shops.iter().filter(|s| s.selling).count();
    let cutoff = chrono::Utc::now() - chrono::Duration::hours(DEMAND_WINDOW_HOURS);
    let recent_trades = store.transactions_since(cutoff)?.len();

    println!("Tradehall store: {}", config.engine.data_dir);
    println!("  accounts:          {}", accounts);
    println!("  listings:          {} ({} active)", listings.len(), active);
    println!("  shops:             {} ({} selling)", shops.len(), selling);
    println!("  trades last {}h:   {}", DEMAND_WINDOW_HOURS, recent_trades);
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();

    // Base level from CLI verbosity overrides config
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    if let Some(cfg) = config {
        if let Some(ref file) = cfg.logging.file {
            if let Ok(f) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
            {
                let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));

                // Check if stdout is a terminal (TTY) - if so, write to both
                // file and console.
                let is_tty = atty::is(atty::Stream::Stdout);

                builder.format(move |fmt, record| {
                    let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                    let line = format!("{} [{}] {}", ts, record.level(), record.args());

                    if let Ok(mut guard) = write_mutex.lock() {
                        let _ = writeln!(guard, "{}", line);
                    }
                    if is_tty {
                        writeln!(fmt, "{}", line)?;
                    }
                    Ok(())
                });
            }
        }
    }

    let _ = builder.try_init();
}
