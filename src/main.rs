use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vidscribe::config::{Config, TenantResolver};
use vidscribe::pipeline::ProcessRequest;
use vidscribe::server::{build_router, build_state, run_server};

#[derive(Parser)]
#[command(name = "vidscribe")]
#[command(version, about = "Video transcription and translation service")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Tenant configuration file (TOML table keyed by client id)
    #[arg(long)]
    tenants: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP/WebSocket server
    Serve {
        /// Address to bind, overriding the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Process one video or prefix and print the result records
    Process {
        /// Storage bucket
        bucket: String,
        /// Video key or prefix
        target: String,
        /// Source language code
        #[arg(short, long, default_value = "en")]
        language: String,
        /// Translate source speech to English during recognition
        #[arg(long)]
        translate: bool,
        /// Target languages for secondary translation
        #[arg(long, value_delimiter = ',')]
        languages: Vec<String>,
        /// Reprocess even when artifacts already exist
        #[arg(long)]
        r#override: bool,
        /// Tenant/client id for URL derivation
        #[arg(long, default_value = "default")]
        client_id: String,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let tenants = match &cli.tenants {
        Some(path) => TenantResolver::load(path).context("Failed to load tenant config")?,
        None => TenantResolver::default(),
    };
    let state = build_state(&config, Arc::new(tenants)).context("Failed to wire application")?;

    match cli.command {
        Command::Serve { bind } => {
            let bind_addr = bind.unwrap_or_else(|| config.bind_addr.clone());
            let router = build_router(state);
            run_server(router, &bind_addr).await?;
        }
        Command::Process {
            bucket,
            target,
            language,
            translate,
            languages,
            r#override,
            client_id,
        } => {
            let request = ProcessRequest {
                bucket,
                target,
                prompt_lang: language,
                enable_translation: translate,
                upload: false,
                upload_bucket: None,
                upload_prefix: None,
                advanced_encoding: false,
                languages,
                override_existing: r#override,
                client_id,
            };

            let results = state.pipeline.process_target(&request).await?;
            info!("Processed {} video(s)", results.len());
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    Ok(())
}
