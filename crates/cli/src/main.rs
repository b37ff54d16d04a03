use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use krakenwatch_data::JsonFileStore;
use krakenwatch_engine::{AgentSettings, JsonLinesSink, OpenOrderAgent};
use krakenwatch_kraken::{KrakenClient, OpenOrderAgentOptions, ValidatedOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "krakenwatch")]
#[command(about = "Watch Kraken open orders and emit newly opened ones as JSON lines")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Agent options file (TOML)
    #[arg(short, long, env = "KRAKENWATCH_CONFIG", default_value = "krakenwatch.toml")]
    config: PathBuf,

    /// API key, overrides `apikey` from the options file
    #[arg(long, env = "KRAKEN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base64 private key, overrides `privatekey` from the options file
    #[arg(long, env = "KRAKEN_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Where the agent keeps its snapshot between polls
    #[arg(long, env = "KRAKENWATCH_MEMORY", default_value = "krakenwatch-memory.json")]
    memory: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll open orders once and emit new ones to stdout
    Poll {
        /// Show what would be emitted without emitting or saving anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Poll repeatedly until interrupted
    Run {
        /// Seconds between polls
        #[arg(long, default_value = "60")]
        every: u64,
    },

    /// Report whether the agent is working (exit code 1 if not)
    Status,

    /// Validate the options and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Events go to stdout, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let options = load_options(&cli)?;
    let validated = options.validate().context("Invalid agent options")?;

    if let Commands::CheckConfig = cli.command {
        println!(
            "Configuration OK (mode: {:?}, debug: {}, expected receive period: {} days)",
            validated.mode,
            validated.debug,
            validated.expected_receive_period.num_days()
        );
        return Ok(());
    }

    let settings = agent_settings(&validated);
    let client = KrakenClient::from_options(validated)?;
    let agent = OpenOrderAgent::new(
        client,
        JsonLinesSink::stdout(),
        JsonFileStore::new(&cli.memory),
        settings,
    );

    match cli.command {
        Commands::Poll { dry_run: true } => {
            let dry = agent.dry_run().await?;
            for order in &dry.would_emit {
                println!("{}", serde_json::to_string(&order.payload)?);
            }
            tracing::info!(
                would_emit = dry.would_emit.len(),
                snapshot_would_change = dry.snapshot_would_change,
                "Dry run complete"
            );
        }
        Commands::Poll { dry_run: false } => {
            let report = agent.poll().await?;
            tracing::info!(
                fetched = report.fetched,
                emitted = report.emitted,
                snapshot_updated = report.snapshot_updated,
                "Poll complete"
            );
        }
        Commands::Run { every } => {
            let every = Duration::from_secs(every.max(1));
            agent.run(every, shutdown_signal()).await;
        }
        Commands::Status => {
            let status = agent.status(chrono::Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !status.working {
                std::process::exit(1);
            }
        }
        Commands::CheckConfig => {}
    }

    Ok(())
}

/// Read the options file (if present) and apply command-line / environment overrides.
fn load_options(cli: &Cli) -> Result<OpenOrderAgentOptions> {
    let mut options = read_options_file(&cli.config)?;
    if let Some(api_key) = &cli.api_key {
        options.apikey = api_key.clone();
    }
    if let Some(private_key) = &cli.private_key {
        options.privatekey = private_key.clone();
    }
    Ok(options)
}

fn read_options_file(path: &Path) -> Result<OpenOrderAgentOptions> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No options file, using defaults");
        return Ok(OpenOrderAgentOptions::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    OpenOrderAgentOptions::from_toml_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn agent_settings(options: &ValidatedOptions) -> AgentSettings {
    AgentSettings {
        mode: options.mode,
        debug: options.debug,
        expected_receive_period: options.expected_receive_period,
        on_corrupt_snapshot: options.on_corrupt_snapshot,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krakenwatch_core::Mode;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from(["krakenwatch", "--memory", "m.json", "run", "--every", "30"]).unwrap();
        assert_eq!(cli.memory, PathBuf::from("m.json"));
        assert!(matches!(cli.command, Commands::Run { every: 30 }));
    }

    #[test]
    fn test_overrides_apply_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("krakenwatch.toml");
        std::fs::write(
            &path,
            "apikey = \"from-file\"\nprivatekey = \"c2VjcmV0\"\nchanges_only = \"false\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "krakenwatch",
            "--config",
            path.to_str().unwrap(),
            "--api-key",
            "from-flag",
            "poll",
        ])
        .unwrap();

        let options = load_options(&cli).unwrap();
        assert_eq!(options.apikey, "from-flag");

        let validated = options.validate().unwrap();
        let settings = agent_settings(&validated);
        assert_eq!(settings.mode, Mode::EmitAll);
        assert!(!settings.debug);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let options = read_options_file(&dir.path().join("absent.toml")).unwrap();
        assert!(options.apikey.is_empty());
        assert!(options.validate().is_err());
    }
}
