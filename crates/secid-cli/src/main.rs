//! secid CLI
//!
//! Offline inspection of security identities and packet markers.
//!
//! # Usage
//!
//! ```bash
//! secid classify 1 2 0x02000001
//! secid decode-mark 0x10920A00 --proto ipv6
//! secid --config /etc/secid/datapath.json check-config
//! secid --format json decode-mark 0x0E00 --encrypt-identity 4242
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use secid_common::DatapathConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "secid")]
#[command(version)]
#[command(about = "Inspect security identities and packet markers", long_about = None)]
struct Cli {
    /// Datapath configuration file (JSON); defaults are used when absent
    #[arg(long, short, env = "SECID_CONFIG")]
    config: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    format: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one or more identities (decimal or 0x hex)
    Classify {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Resolve the origin identity a marker word encodes
    DecodeMark {
        mark: String,
        #[arg(long, default_value = "ipv4")]
        proto: commands::Proto,
        /// Identity stashed in the encryption control-block slot
        #[arg(long)]
        encrypt_identity: Option<u32>,
    },
    /// Load, validate and print the datapath configuration
    CheckConfig,
}

fn load_config(path: Option<&str>) -> anyhow::Result<DatapathConfig> {
    match path {
        Some(path) => DatapathConfig::load(path)
            .with_context(|| format!("loading datapath config from {path}")),
        None => {
            tracing::debug!("no config given, using defaults");
            Ok(DatapathConfig::default())
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify { ids } => {
            cli.format.print(&commands::classify(&config, &ids)?)?;
        }
        Commands::DecodeMark {
            mark,
            proto,
            encrypt_identity,
        } => {
            cli.format
                .print(&commands::decode_mark(&config, &mark, proto, encrypt_identity)?)?;
        }
        Commands::CheckConfig => {
            config.validate()?;
            tracing::info!(
                dual_stack = config.features.dual_stack(),
                ipsec = config.features.enable_ipsec,
                "configuration is valid"
            );
            cli.format.print(&config)?;
        }
    }

    Ok(())
}
