mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cloug_providers::{provider_from_config, ProviderConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cloug", version)]
#[command(about = "Operate compute instances through a configured cloud provider", long_about = None)]
struct Cli {
    /// Path to the provider configuration file
    #[arg(long, default_value = "cloug.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Show the capabilities of the configured provider
    Capabilities,
    /// List all instances
    ListInstances,
    /// Show one instance
    GetInstance { id: String },
    /// Create an instance
    CreateInstance(CreateArgs),
    /// Delete an instance
    DeleteInstance { id: String },
    /// Power on an instance
    Start { id: String },
    /// Power off an instance
    Stop { id: String },
    /// Reboot an instance
    Reboot { id: String },
    /// List the flavor catalog
    ListFlavors,
    /// List the image catalog
    ListImages,
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct CreateArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub region: Option<String>,
    /// Provider image ID
    #[arg(long)]
    pub image: Option<String>,
    /// Provider flavor ID; overrides --cores/--memory-mb/--disk-gb matching
    #[arg(long)]
    pub flavor: Option<String>,
    #[arg(long)]
    pub cores: Option<u32>,
    #[arg(long)]
    pub memory_mb: Option<u32>,
    #[arg(long)]
    pub disk_gb: Option<u32>,
    /// Public key to install, OpenSSH or RFC 4716 format
    #[arg(long)]
    pub ssh_key_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ProviderConfig::load(&cli.config)?;
    let provider = provider_from_config(&config)?;
    let output = commands::run(provider.as_ref(), cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
