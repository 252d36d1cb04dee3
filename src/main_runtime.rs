use pumpgate::adapters::BinancePriceLookup;
use pumpgate::cli::{parse_run_line, RunLine};
use pumpgate::config::{AppConfig, LoggingConfig};
use pumpgate::coordination::{GracefulShutdown, LossCircuitBreaker};
use pumpgate::domain::MarketSignal;
use pumpgate::error::{PumpGateError, Result};
use pumpgate::safety::{RetrainAck, RetrainGate, TradeOutcomeRecord};
use pumpgate::strategy::{
    AdaptiveTargetEngine, CoinProfile, DecisionPipeline, PumpTargetEngine,
    SignalConfirmationFilter, SignalRouter,
};
use pumpgate::MarketDataEnricher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Console logging to stderr (stdout carries decisions) plus a daily rolling
/// file when the log directory is writable.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let log_dir = std::env::var("PUMPGATE_LOG_DIR")
        .ok()
        .or_else(|| config.dir.clone());

    // `tracing_appender::rolling::daily` panics if it can't create the initial
    // log file, so preflight writability.
    let file_layer = log_dir.as_deref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                log_dir, e
            );
            return None;
        }
        let test_path = std::path::Path::new(log_dir).join(".pumpgate_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let file_appender = tracing_appender::rolling::daily(log_dir, "pumpgate.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Flushes on drop; lives for the whole process
                Box::leak(Box::new(guard));
                eprintln!("Logging to: {}/pumpgate.log", log_dir);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

fn build_pipeline(config: &AppConfig, live: bool) -> Result<DecisionPipeline> {
    let mut enricher = MarketDataEnricher::new(config.feed.clone());
    if live && config.feed.live_price_lookup {
        let lookup = BinancePriceLookup::new(
            &config.feed.rest_url,
            Duration::from_millis(config.feed.price_lookup_timeout_ms),
        )?;
        enricher = enricher.with_price_lookup(Arc::new(lookup));
    }

    Ok(DecisionPipeline::new(
        Arc::new(enricher),
        Arc::new(SignalConfirmationFilter::new(config.filter.clone())),
        Arc::new(SignalRouter::new(config.router.clone(), config.modes.clone())),
        Arc::new(AdaptiveTargetEngine::new(config.targets.clone())),
        Arc::new(LossCircuitBreaker::new(config.breaker.clone())),
    ))
}

async fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    Ok(buf)
}

async fn signal_arg(signal: Option<&str>) -> Result<MarketSignal> {
    match signal {
        Some(text) => MarketSignal::from_json(text),
        None => MarketSignal::from_json(read_stdin().await?.trim()),
    }
}

async fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// Stream decisions for stdin signals until EOF or Ctrl-C
pub async fn run_decide(config: &AppConfig, symbols: &[String], offline: bool) -> Result<()> {
    let pipeline = build_pipeline(config, !offline)?;
    let shutdown = Arc::new(GracefulShutdown::new());

    let feed = if offline {
        info!("Offline mode: enrichment uses signal prices only");
        None
    } else {
        pipeline.enricher().subscribe(symbols.iter().cloned()).await;
        let enricher = Arc::clone(pipeline.enricher());
        let listener = shutdown.listener();
        Some(tokio::spawn(async move {
            if let Err(e) = enricher.run(listener).await {
                error!("Market feed failed: {}", e);
            }
        }))
    };

    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move { shutdown.wait_for_ctrl_c().await });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut listener = shutdown.listener();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = listener.recv() => break,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_run_line(line) {
            Ok(RunLine::Signal(signal, ctx)) => {
                if !offline {
                    pipeline.enricher().subscribe([signal.symbol.clone()]).await;
                }
                let decision = pipeline.evaluate(&signal, &ctx).await;
                print_json(&decision).await?;
            }
            Ok(RunLine::Outcome(outcome)) => {
                pipeline
                    .record_outcome(outcome.win, outcome.loss_pct, &outcome.symbol, &outcome.reason)
                    .await;
            }
            Err(e) => warn!("Rejected input line: {}", e),
        }
    }

    shutdown.request(pumpgate::ShutdownSignal::Graceful);
    if let Some(feed) = feed {
        if tokio::time::timeout(Duration::from_secs(5), feed).await.is_err() {
            warn!("Market feed shutdown timed out after 5s");
        }
    }

    let status = pipeline.breaker().get_status().await;
    info!(
        "Breaker at exit: {} ({} losses today, {} trips)",
        status.state, status.daily_losses, status.total_trips
    );
    Ok(())
}

pub async fn run_route(config: &AppConfig, signal: Option<&str>) -> Result<()> {
    let signal = signal_arg(signal).await?;
    let router = SignalRouter::new(config.router.clone(), config.modes.clone());
    print_json(&router.route(&signal)).await
}

pub async fn run_pump_target(
    config: &AppConfig,
    signal: Option<&str>,
    volatility: f64,
    drawdown: f64,
) -> Result<()> {
    let signal = signal_arg(signal).await?;
    let engine = PumpTargetEngine::new(config.pump_tiers.clone());
    let coin = CoinProfile {
        volatility_multiplier: volatility,
        max_drawdown_pct: drawdown,
    };
    print_json(&engine.calculate(&signal, &coin)).await
}

pub async fn run_ack_issue(
    config: &AppConfig,
    reason: &str,
    operator: &str,
    ttl_hours: i64,
    path: Option<&str>,
) -> Result<()> {
    let ack = RetrainAck::issue(reason, operator, RetrainAck::ttl_hours(ttl_hours)?)?;
    let path = path
        .map(PathBuf::from)
        .unwrap_or_else(|| config.retrain.ack_path.clone());
    ack.write_to(&path).await?;
    print_json(&ack).await
}

/// Prints the permission; a denied retrain is reported through the exit code
pub async fn run_retrain_check(config: &AppConfig, outcomes_path: &str) -> Result<bool> {
    let content = tokio::fs::read_to_string(outcomes_path).await?;
    let outcomes: Vec<TradeOutcomeRecord> = serde_json::from_str(&content).map_err(|e| {
        PumpGateError::Validation(format!("outcomes file {}: {}", outcomes_path, e))
    })?;

    let gate = RetrainGate::new(config.retrain.clone());
    let permission = gate.check_all(&outcomes).await;
    print_json(&permission).await?;
    Ok(permission.allowed)
}
