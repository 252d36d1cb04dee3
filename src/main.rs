use clap::Parser;
use pumpgate::cli::{AckCommands, Cli, Commands};
use pumpgate::config::AppConfig;
use pumpgate::error::Result;

mod main_runtime;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir)?;
    main_runtime::init_logging(&config.logging);

    match &cli.command {
        Commands::Run { symbols, offline } => {
            main_runtime::run_decide(&config, symbols, *offline).await?;
        }
        Commands::Route { signal } => {
            main_runtime::run_route(&config, signal.as_deref()).await?;
        }
        Commands::PumpTarget {
            signal,
            volatility,
            drawdown,
        } => {
            main_runtime::run_pump_target(&config, signal.as_deref(), *volatility, *drawdown)
                .await?;
        }
        Commands::Ack(AckCommands::Issue {
            reason,
            operator,
            ttl_hours,
            path,
        }) => {
            main_runtime::run_ack_issue(&config, reason, operator, *ttl_hours, path.as_deref())
                .await?;
        }
        Commands::RetrainCheck { outcomes } => {
            if !main_runtime::run_retrain_check(&config, outcomes).await? {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
