use anyhow::Context;
use clap::Parser;
use rust_decimal::Decimal;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use strikebot::config::{credentials_from_env, BotConfig, Network};
use strikebot::UnitExit;

#[derive(Parser, Debug)]
#[command(
    name = "strikebot",
    about = "Three-candle strike trading bot for Binance spot"
)]
struct Cli {
    /// TOML config file (optional; defaults apply when missing)
    #[arg(long, default_value = "strikebot.toml")]
    config: PathBuf,

    /// Trade on the Binance spot testnet
    #[arg(long, default_value_t = false)]
    testnet: bool,

    /// Trading pairs, comma separated (e.g. BTCUSDT,ETHUSDT)
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Quote currency spent per buy
    #[arg(long)]
    quote_amount: Option<Decimal>,
}

impl Cli {
    /// Command-line flags win over file and environment
    fn apply(&self, config: &mut BotConfig) -> anyhow::Result<()> {
        if self.testnet {
            config.network = Network::Testnet;
        }
        if !self.symbols.is_empty() {
            config.symbols = self.symbols.clone();
        }
        if let Some(amount) = self.quote_amount {
            config.quote_amount = amount;
        }

        config.normalize();
        config.validate().context("invalid command-line overrides")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = BotConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    cli.apply(&mut config)?;

    setup_logging(&config.log_file);

    // Refuse to start without usable keys
    let credentials = credentials_from_env().context("API credentials")?;

    tracing::info!("🚀 Strikebot starting - one unit per symbol");
    match config.network {
        Network::Live => tracing::warn!("⚠️  WARNING: Mainnet (real money) is enabled"),
        Network::Testnet => tracing::info!("🧪 Testnet mode"),
    }

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Trading pairs: {}", config.symbols.join(", "));
    tracing::info!("  Quote per trade: {}", config.quote_amount.normalize());
    tracing::info!(
        "  Min seconds between actions: {}",
        config.min_secs_between_actions
    );
    tracing::info!("  Candle interval: {}", config.kline_interval);
    tracing::info!("  Log file: {}", config.log_file);
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let report = strikebot::run_bot(&config, credentials, shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    for (symbol, exit) in &report.exits {
        match exit {
            UnitExit::Stopped => tracing::info!("  {}: stopped", symbol),
            UnitExit::Disabled(reason) => tracing::warn!("  {}: disabled ({})", symbol, reason),
            UnitExit::Panicked(msg) => tracing::error!("  {}: panicked ({})", symbol, msg),
            UnitExit::Aborted => tracing::warn!("  {}: aborted mid-cycle", symbol),
        }
    }

    tracing::info!("👋 Strikebot stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(log_file: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strikebot=info"));

    // Plain-text copy of every event, appended across runs
    let file_layer = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!("⚠️  Could not open log file {}: {}", log_file, e);
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("\n⚠️  Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("\n⚠️  Received SIGTERM, shutting down..."),
    }
}
