use anyhow::Context;
use bodega_node::config::NodeConfig;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node with the backends named in the config file
    Run {
        /// Path to the node config file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.cmd {
        Commands::Run { config } => {
            let raw = std::fs::read_to_string(&config)
                .with_context(|| format!("failed to read config file {}", config.display()))?;
            let config: NodeConfig = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", config.display()))?;
            bodega_node::run_node(config).await
        }
    }
}
