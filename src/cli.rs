use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::domain::{MarketSignal, RawSignal};
use crate::error::Result;
use crate::strategy::MarketContext;

#[derive(Parser)]
#[command(name = "pumpgate")]
#[command(version)]
#[command(about = "Pump/drop signal decision core", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml, $PUMPGATE_ENV)
    #[arg(short, long, default_value = "config", env = "PUMPGATE_CONFIG_DIR")]
    pub config_dir: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decide on JSONL signals from stdin, one outbound decision per line on stdout
    Run {
        /// Extra symbols to stream in addition to the configured ones
        #[arg(short, long, value_delimiter = ',')]
        symbols: Vec<String>,
        /// Do not connect to the market feed
        #[arg(long)]
        offline: bool,
    },
    /// Route one signal and print the mode decision
    Route {
        /// Signal JSON; read from stdin when omitted
        #[arg(short, long)]
        signal: Option<String>,
    },
    /// Tiered pump-strength targets for one signal
    PumpTarget {
        /// Signal JSON; read from stdin when omitted
        #[arg(short, long)]
        signal: Option<String>,
        /// Coin volatility multiplier
        #[arg(long, default_value = "1.0")]
        volatility: f64,
        /// Typical historical drawdown after a pump, percent
        #[arg(long, default_value = "0.0")]
        drawdown: f64,
    },
    /// Operator retrain acknowledgments
    #[command(subcommand)]
    Ack(AckCommands),
    /// Evaluate the retrain gate over an outcomes JSON file
    RetrainCheck {
        /// JSON array of {is_win, timestamp|closed_at}
        #[arg(short, long)]
        outcomes: String,
    },
}

#[derive(Subcommand)]
pub enum AckCommands {
    /// Issue a signed, expiring retrain acknowledgment
    Issue {
        #[arg(short, long)]
        reason: String,
        #[arg(short, long)]
        operator: String,
        #[arg(long, default_value = "24")]
        ttl_hours: i64,
        /// Output path; defaults to the configured ack path
        #[arg(short, long)]
        path: Option<String>,
    },
}

/// Realised trade result fed back through `run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub symbol: String,
    pub win: bool,
    #[serde(default)]
    pub loss_pct: f64,
    #[serde(default)]
    pub reason: String,
}

/// One stdin line of the `run` command
#[derive(Debug, Clone)]
pub enum RunLine {
    Signal(MarketSignal, MarketContext),
    Outcome(OutcomeReport),
}

/// Accepts `{"outcome": {...}}`, `{"signal": {...}, "context": {...}}` or a
/// bare signal object.
pub fn parse_run_line(text: &str) -> Result<RunLine> {
    let mut value: serde_json::Value = serde_json::from_str(text)?;

    if let Some(outcome) = value.get_mut("outcome").map(serde_json::Value::take) {
        return Ok(RunLine::Outcome(serde_json::from_value(outcome)?));
    }

    if let Some(signal) = value.get_mut("signal").map(serde_json::Value::take) {
        let context = match value.get_mut("context").map(serde_json::Value::take) {
            Some(ctx) => serde_json::from_value(ctx)?,
            None => MarketContext::default(),
        };
        let raw: RawSignal = serde_json::from_value(signal)?;
        return Ok(RunLine::Signal(MarketSignal::try_from(raw)?, context));
    }

    let raw: RawSignal = serde_json::from_value(value)?;
    Ok(RunLine::Signal(MarketSignal::try_from(raw)?, MarketContext::default()))
}
