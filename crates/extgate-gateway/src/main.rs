//! Extgate — extension gateway over a stdio line protocol

use clap::{Parser, Subcommand};
use extgate_core::{GatewayConfig, LoggingConfig, RpcRequest, RpcResponse};
use extgate_gateway::{builtin, route_rpc, to_response, ConnectionContext, Gateway};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "extgate", about = "Extgate — plugin tool gateway for agents")]
struct Cli {
    /// Config file (TOML). Missing or malformed files fall back to defaults.
    #[arg(short, long, default_value = "extgate.toml", global = true)]
    config: PathBuf,

    /// Plugin directory (overrides config and EXTGATE_PLUGIN_DIR)
    #[arg(short, long, global = true)]
    plugins: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-RPC requests on stdin/stdout, one per line
    Serve,
    /// Load plugins and print their states
    Plugins,
    /// Load plugins and print the aggregated tool catalogue
    Tools,
    /// Print the effective configuration as TOML
    Config,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::load(&cli.config).with_env_overrides();
    if let Some(dir) = cli.plugins {
        config.plugins.dir = dir;
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let _guard = init_logging(&config.logging)?;
            serve(config).await?;
        }
        Commands::Plugins => {
            let _guard = init_logging(&config.logging)?;
            let gateway = Gateway::builder(config).catalog(builtin::catalog()).build()?;
            let statuses = gateway.load_plugins().await;
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
        Commands::Tools => {
            let _guard = init_logging(&config.logging)?;
            let gateway = Gateway::builder(config).catalog(builtin::catalog()).build()?;
            gateway.load_plugins().await;
            println!("{}", serde_json::to_string_pretty(&*gateway.table().definitions())?);
        }
        Commands::Config => {
            print!("{}", config.to_toml());
        }
        Commands::Version => {
            println!("extgate v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// stderr always; a daily-rolling JSON file as well when `logging.dir` is set.
/// stdout is reserved for protocol traffic.
fn init_logging(
    config: &LoggingConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "extgate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;
    Ok(guard)
}

async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let gateway = Arc::new(Gateway::builder(config).catalog(builtin::catalog()).build()?);

    let statuses = gateway.load_plugins().await;
    info!(
        "Extgate ready: {} plugins discovered, {} tools",
        statuses.len(),
        gateway.table().len()
    );

    let shutdown = CancellationToken::new();
    let sweeper = gateway.spawn_sweeper(shutdown.clone());

    let mut ctx = ConnectionContext::new(gateway);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(req) => {
                let result = route_rpc(&req.method, req.params, &mut ctx).await;
                to_response(&req.id, result)
            }
            Err(e) => {
                warn!("Unparseable request: {}", e);
                RpcResponse::parse_error(format!("Parse error: {}", e))
            }
        };

        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    shutdown.cancel();
    let _ = sweeper.await;
    info!("Extgate stopped");
    Ok(())
}
