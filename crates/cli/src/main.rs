mod config_commands;
mod console;

use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    parley_config::ParleyConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "parley", about = "Parley, per-conversation chat event dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of discovering `parley.{toml,yaml,json}`.
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher over a console channel reading stdin.
    Run,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

/// Logs go to stderr so stdout carries only replies.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Load the explicit config file, or discover one and fall back to defaults.
pub(crate) fn load_config(explicit: Option<&Path>) -> anyhow::Result<ParleyConfig> {
    match explicit {
        Some(path) => parley_config::load_config(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(parley_config::discover_and_load()),
    }
}

#[cfg(feature = "metrics")]
fn init_metrics(config: &ParleyConfig) -> anyhow::Result<parley_metrics::MetricsHandle> {
    let handle = parley_metrics::init_metrics(parley_metrics::MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: Vec::new(),
    })?;
    Ok(handle)
}

async fn run(explicit: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(explicit)?;
    let result = parley_config::validate(&config);
    if result.has_errors() {
        for d in &result.diagnostics {
            tracing::error!(path = %d.path, "{}", d.message);
        }
        anyhow::bail!("invalid configuration, run `parley config check` for details");
    }

    #[cfg(feature = "metrics")]
    let metrics = init_metrics(&config)?;

    console::run(config).await?;

    #[cfg(feature = "metrics")]
    {
        let rendered = metrics.render();
        if !rendered.is_empty() {
            eprintln!("{rendered}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "parley starting");

    match cli.command {
        Commands::Run => run(cli.config.as_deref()).await,
        Commands::Config { action } => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
    }
}

#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "parley",
            "config",
            "check",
            "--config",
            "/tmp/p.toml",
            "--json-logs",
        ])
        .unwrap();
        assert!(cli.json_logs);
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/p.toml")));
        assert!(matches!(cli.command, Commands::Config { .. }));
    }

    #[test]
    fn explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[dispatch]\ntick_interval_ms = 50\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.dispatch.tick_interval_ms, 50);
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
