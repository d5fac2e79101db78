// Spot Grid Bot - CLI
// Single entry point for running, resuming and unwinding a grid

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};

use spot_grid_bot::core::ShutdownSignal;
use spot_grid_bot::{
    BitkubClient, Config, ConfigError, GridEngine, Journal, TickerCache, TickerStream, TradingError,
};

#[derive(Parser)]
#[command(name = "grid-bot")]
#[command(version = "0.3.0")]
#[command(about = "Spot grid trading bot", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example configuration file
    Init,

    /// Cancel stale orders, deploy the grid and keep it replenished
    Start,

    /// Keep reconciling the orders already open on the exchange
    Resume,

    /// Cancel everything and buy the base asset with the whole quote balance
    Emergency {
        /// Required, this cannot be undone
        #[arg(long)]
        yes: bool,
    },

    /// Show the grid that `start` would place at the current price
    Preview,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Init doesn't require config (it creates it)
    if let Commands::Init = cli.command {
        init_logging(if cli.verbose { "debug" } else { "info" });
        return init_workspace(&cli.config);
    }

    let config = match load_config(&cli.config) {
        Ok(config) => {
            init_logging(if cli.verbose { "debug" } else { &config.logging.level });
            config
        }
        Err(e) => {
            init_logging("info");
            error!("❌ Configuration Error");
            error!("{}", e);
            if matches!(e, ConfigError::FileRead(_)) {
                error!("");
                error!("💡 Quick fix:");
                error!("   1. Run: grid-bot init");
                error!("   2. Edit config.toml with your API keys");
                error!("   3. Try again");
            }
            std::process::exit(1);
        }
    };

    info!("🚀 Spot Grid Bot v0.3.0");
    info!("📁 Config: {}", cli.config);

    let result = match cli.command {
        Commands::Init => Ok(()),
        Commands::Start => run_engine(config, false).await,
        Commands::Resume => run_engine(config, true).await,
        Commands::Emergency { yes } => emergency(config, yes).await,
        Commands::Preview => preview(config).await,
    };

    if let Err(e) = result {
        error!("❌ {}", e.user_message());
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn load_config(path: &str) -> Result<Config, ConfigError> {
    let mut config = Config::from_file(path)?;
    config.apply_env_overrides();
    Ok(config)
}

fn init_workspace(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    use std::fs;

    info!("🔧 Initializing workspace...");
    fs::create_dir_all("data")?;

    if !std::path::Path::new(config_path).exists() {
        let default_config = include_str!("../../config.toml.example");
        fs::write(config_path, default_config)?;
        info!("📝 Created {}", config_path);
    } else {
        warn!("⚠️  {} already exists, skipping", config_path);
    }

    info!("✅ Workspace initialized successfully!");
    info!("💡 Next steps:");
    info!("   1. Edit {} or export BITKUB_API_KEY / BITKUB_API_SECRET", config_path);
    info!("   2. Run: grid-bot preview");
    info!("   3. Run: grid-bot start");

    Ok(())
}

fn build_engine(
    config: &Config,
    ticker_cache: Option<TickerCache>,
) -> Result<GridEngine<BitkubClient>, TradingError> {
    let mut client = BitkubClient::new(&config.exchange)?;
    if let Some(cache) = ticker_cache {
        client = client.with_ticker_cache(cache, Duration::from_secs(config.exchange.ticker_max_age_secs));
    }

    let mut engine = GridEngine::new(config.grid.clone(), config.engine.clone(), Arc::new(client));

    if config.journal.enabled {
        match Journal::open(&config.journal.db_path) {
            Ok(journal) => {
                info!("📒 Journal: {}", config.journal.db_path);
                engine = engine.with_journal(journal);
            }
            Err(e) => warn!("⚠️  Journal disabled: {}", e),
        }
    }

    Ok(engine)
}

async fn run_engine(config: Config, resume: bool) -> Result<(), TradingError> {
    if !config.has_credentials() {
        return Err(TradingError::InvalidParameter(
            "api_key".to_string(),
            "API credentials are required for trading".to_string(),
        ));
    }

    let feed_shutdown = ShutdownSignal::new();
    let cache = TickerCache::new();
    let feed = TickerStream::new(&config.exchange.ws_url, &config.grid.symbol, cache.clone())
        .spawn(feed_shutdown.clone());

    let engine = build_engine(&config, Some(cache))?;
    let handle = engine.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Ctrl-C received, stopping after the current pass");
            handle.stop();
        }
    });

    let result = if resume { engine.resume().await } else { engine.start().await };

    feed_shutdown.trigger();
    let _ = feed.await;

    result
}

async fn emergency(config: Config, confirmed: bool) -> Result<(), TradingError> {
    if !confirmed {
        warn!("⚠️  Emergency action cancels every {} order and market-buys with the whole balance", config.grid.symbol);
        warn!("💡 Re-run with --yes to proceed");
        return Ok(());
    }

    let engine = build_engine(&config, None)?;
    let report = engine.emergency_action().await?;

    match report.cancel_task.await {
        Ok(Ok(cancelled)) => info!("🧹 Cancelled {} orders", cancelled),
        Ok(Err(e)) => error!("❌ Cancel-all failed: {}", e),
        Err(e) => error!("❌ Cancel-all task panicked: {}", e),
    }

    if let Some(order) = report.market_order {
        info!("✅ Market buy placed: {} (rate {:.2})", order.hash, order.rate);
    }

    Ok(())
}

async fn preview(config: Config) -> Result<(), TradingError> {
    let engine = build_engine(&config, None)?;
    let levels = engine.preview_grid().await?;

    info!("📐 Grid for {} ({} levels, {}% spacing)", config.grid.symbol, levels.len(), config.grid.grid_spacing);
    for level in &levels {
        info!(
            "   L{:<2} BUY  {:>14.2} x {:>12.2} | SELL {:>14.2} x {:.8}",
            level.level, level.price_buy, level.amount_buy, level.price_sell, level.amount_sell
        );
    }

    Ok(())
}
