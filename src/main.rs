use anyhow::Result;
use authgate::auth::DeviceCodeFlow;
use authgate::config::{CliOverrides, Config, EnvironmentOverrides, LoggingConfig};
use authgate::mcp::McpServer;
use authgate::startup::{self, StartupInfo, StartupLogger};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = authgate::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Let login, logout and verify-login through without a bearer token
    #[arg(long)]
    enable_auth_tools: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        host: cli.host,
        port: cli.port,
        enable_auth_tools: cli.enable_auth_tools,
        log_level: cli.log_level,
    };

    let config = match Config::load(&cli.config, overrides) {
        Ok(config) => config,
        Err(e) => {
            // Logging is configured from the file, so report load failures directly
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    init_logging(&config.logging)?;
    startup::display_startup_banner(authgate::VERSION);

    let flow = DeviceCodeFlow::new(
        config.auth.provider.clone(),
        Duration::from_secs(config.server.timeout),
    )
    .map_err(|e| {
        error!("Failed to create device code client: {}", e);
        e
    })?;

    let server = McpServer::from_config(&config, Arc::new(flow));

    let config_path = cli.config.exists().then(|| cli.config.clone());
    let startup_info = StartupInfo::new(config_path, EnvironmentOverrides::load()?)
        .with_tools_loaded(server.registry().len());
    StartupLogger::display_startup_info(&config, authgate::VERSION, &startup_info);

    server.start(&config.server.host, config.server.port).await?;

    info!("authgate shut down");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if logging.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(())
}
