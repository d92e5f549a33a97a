use clap::Parser;
use tracing_subscriber::EnvFilter;

use cs_domain::config::ObservabilityConfig;
use cs_runtime::bootstrap;
use cs_runtime::cli::{self, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = cli::load_config()?;
    init_tracing(&config.observability);

    match cli.command {
        Command::Replay { file, chat } => {
            let (state, _mirror_rx) = bootstrap::build_app_state(config)?;
            cli::replay::run(&state, &file, chat).await
        }
        Command::Decode { closed } => cli::decode::run(closed),
        Command::Analyze { chat } => {
            let provider = bootstrap::build_provider(&config)?;
            let (state, mirror_rx) = bootstrap::build_app_state(config)?;
            cli::analyze::run(state, mirror_rx, provider, chat).await
        }
        Command::Config(ConfigCommand::Show) => cli::config::show(&config, &config_path),
    }
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG`
/// overrides the configured filter.
fn init_tracing(obs: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.log_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    if obs.json_logs {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
