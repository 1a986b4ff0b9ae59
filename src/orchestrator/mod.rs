// Per-symbol unit supervision
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::api::ExchangeGateway;
use crate::execution::{OrderExecutor, SymbolEngine};
use crate::models::SymbolConfig;
use crate::stream::consumer::wait_for_shutdown;
use crate::stream::{MarketStream, ReconnectPolicy, StreamConsumer};

/// How a symbol unit ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitExit {
    /// Stopped cleanly on shutdown
    Stopped,
    /// Never started trading; filters could not be loaded
    Disabled(String),
    /// Panicked; other units were unaffected
    Panicked(String),
    /// Still busy when the shutdown grace period ran out
    Aborted,
}

#[derive(Debug, Default)]
pub struct OrchestratorReport {
    pub exits: BTreeMap<String, UnitExit>,
}

impl OrchestratorReport {
    pub fn exit_of(&self, symbol: &str) -> Option<&UnitExit> {
        self.exits.get(symbol)
    }

    pub fn disabled(&self) -> Vec<&str> {
        self.exits
            .iter()
            .filter(|(_, exit)| matches!(exit, UnitExit::Disabled(_)))
            .map(|(symbol, _)| symbol.as_str())
            .collect()
    }
}

/// Runs one independent unit per symbol until shutdown
pub struct Orchestrator {
    gateway: Arc<dyn ExchangeGateway>,
    stream: Arc<dyn MarketStream>,
    symbols: Vec<SymbolConfig>,
    policy: ReconnectPolicy,
    grace: Duration,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        stream: Arc<dyn MarketStream>,
        symbols: Vec<SymbolConfig>,
        policy: ReconnectPolicy,
        grace: Duration,
    ) -> Self {
        Self {
            gateway,
            stream,
            symbols,
            policy,
            grace,
        }
    }

    /// Start every unit and supervise them until `shutdown` resolves
    ///
    /// Units that exit early (disabled or panicked) are logged and not
    /// restarted; the orchestrator keeps waiting for `shutdown` regardless.
    pub async fn run<F>(self, shutdown: F) -> OrchestratorReport
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut units: JoinSet<(String, UnitExit)> = JoinSet::new();
        let mut running: BTreeSet<String> = BTreeSet::new();
        let mut report = OrchestratorReport::default();

        for config in self.symbols {
            let symbol = config.symbol.clone();
            tracing::info!("Initializing bot for: {}", symbol);

            let unit = run_unit(
                config,
                self.gateway.clone(),
                self.stream.clone(),
                self.policy.clone(),
                stop_rx.clone(),
            );
            units.spawn(supervise(symbol.clone(), unit));
            running.insert(symbol);
        }

        tracing::info!("All {} symbol units are running", running.len());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                joined = units.join_next(), if !units.is_empty() => {
                    if let Some(joined) = joined {
                        record(&mut report, &mut running, joined);
                    }
                    if units.is_empty() {
                        tracing::warn!("Every symbol unit has exited; waiting for shutdown");
                    }
                }
            }
        }

        tracing::info!("Shutdown requested, stopping {} units", running.len());
        let _ = stop_tx.send(true);

        let deadline = tokio::time::sleep(self.grace);
        tokio::pin!(deadline);
        let mut aborted = false;

        loop {
            tokio::select! {
                joined = units.join_next() => match joined {
                    Some(joined) => record(&mut report, &mut running, joined),
                    None => break,
                },
                _ = &mut deadline, if !aborted => {
                    tracing::warn!(
                        "Grace period of {:?} elapsed, aborting {} units",
                        self.grace,
                        running.len()
                    );
                    units.abort_all();
                    aborted = true;
                }
            }
        }

        for symbol in running {
            report.exits.insert(symbol, UnitExit::Aborted);
        }

        report
    }
}

/// Load filters, build the engine and consume the stream until shutdown
async fn run_unit(
    config: SymbolConfig,
    gateway: Arc<dyn ExchangeGateway>,
    stream: Arc<dyn MarketStream>,
    policy: ReconnectPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> UnitExit {
    let symbol = config.symbol.clone();

    let loaded = tokio::select! {
        biased;
        _ = wait_for_shutdown(&mut shutdown) => return UnitExit::Stopped,
        loaded = gateway.symbol_filters(&symbol) => loaded,
    };

    let filters = match loaded {
        Ok(filters) => filters,
        Err(e) => {
            tracing::error!("[{}] Error: failed to load symbol filters: {}", symbol, e);
            return UnitExit::Disabled(e.to_string());
        }
    };
    tracing::info!("[{}] Filters loaded: {}", symbol, filters);

    let executor = OrderExecutor::new(symbol.clone(), gateway, filters);
    let mut engine = SymbolEngine::new(config, executor);
    tracing::info!(
        "[{}] {} armed, quote per buy {}",
        symbol,
        engine.strategy_name(),
        engine.config().quote_amount.normalize()
    );
    let consumer = StreamConsumer::new(symbol, stream, policy);

    consumer.run(&mut engine, shutdown).await;
    UnitExit::Stopped
}

/// Aborts the inner task when the supervising task is itself aborted
struct AbortOnDrop(JoinHandle<UnitExit>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run a unit in its own task so a panic is reported instead of propagated
async fn supervise<F>(symbol: String, unit: F) -> (String, UnitExit)
where
    F: Future<Output = UnitExit> + Send + 'static,
{
    let mut inner = AbortOnDrop(tokio::spawn(unit));

    let exit = match (&mut inner.0).await {
        Ok(exit) => exit,
        Err(e) if e.is_panic() => UnitExit::Panicked(panic_message(e.into_panic())),
        Err(_) => UnitExit::Aborted,
    };

    (symbol, exit)
}

fn record(
    report: &mut OrchestratorReport,
    running: &mut BTreeSet<String>,
    joined: Result<(String, UnitExit), JoinError>,
) {
    let (symbol, exit) = match joined {
        Ok(done) => done,
        // Supervisor tasks only fail when aborted; the symbol stays in `running`
        Err(_) => return,
    };

    match &exit {
        UnitExit::Stopped => tracing::info!("[{}] Unit stopped", symbol),
        UnitExit::Disabled(reason) => {
            tracing::error!("[{}] Unit disabled: {}", symbol, reason)
        }
        UnitExit::Panicked(msg) => tracing::error!("[{}] Unit panicked: {}", symbol, msg),
        UnitExit::Aborted => tracing::warn!("[{}] Unit aborted", symbol),
    }

    running.remove(&symbol);
    report.exits.insert(symbol, exit);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
