//! hostmetrics daemon
//!
//! Prometheus exporter over a management provider, with ad hoc query and
//! connectivity commands

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use clap::{Parser, Subcommand};
use color_eyre::Result;
use eyre::WrapErr;
use hostmetrics_collector::{Exporter, collectors_by_name};
use hostmetrics_mi::{Application, Dialect, Namespace, OperationFlags};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod factory;
mod router;
mod state;

use crate::config::{Config, LogFormat};
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "hostmetrics")]
#[command(about = "Host metrics exporter over a management provider", long_about = None)]
struct Cli {
    /// Config file (default: $HOSTMETRICS_CONFIG, then the common paths)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log line format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Provider snapshot to serve, overriding the config file
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve /metrics and /health
    Serve {
        /// Address and port to bind to
        #[arg(short, long)]
        bind: Option<String>,
        /// Collectors to enable, comma separated
        #[arg(long, value_delimiter = ',')]
        collectors: Option<Vec<String>>,
    },
    /// Run one WQL query and print the instances as JSON
    Query {
        /// Query text, e.g. "SELECT Name FROM Win32_Process"
        query: String,
        /// Namespace to query (default from config)
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Open a session and test the connection
    Check,
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let path = cli.config.clone().or_else(Config::locate);
    let mut config = match &path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(level) = cli.log_level {
        config.daemon.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.daemon.log_format = format;
    }
    if let Some(snapshot) = cli.snapshot {
        config.provider.snapshot = Some(snapshot);
    }

    init_tracing(&config.daemon.log_level, config.daemon.log_format);
    match &path {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => warn!("no config file found, using defaults"),
    }

    match cli.command {
        Commands::Serve { bind, collectors } => {
            if let Some(bind) = bind {
                config.daemon.bind = bind;
            }
            if let Some(collectors) = collectors {
                config.collectors.enabled = collectors;
            }
            serve(config).await
        }
        Commands::Query { query, namespace } => {
            tokio::task::spawn_blocking(move || run_query(&config, &query, namespace)).await?
        }
        Commands::Check => tokio::task::spawn_blocking(move || check(&config)).await?,
    }
}

async fn serve(config: Config) -> Result<()> {
    let provider = factory::create_provider(&config)?;
    let collectors = collectors_by_name(&config.collectors.enabled)?;
    let options = config.mi.destination_options();

    let exporter = tokio::task::spawn_blocking(move || {
        Exporter::new(provider.clone(), provider, &options, collectors)
    })
    .await?
    .wrap_err("failed to start exporter")?;
    let exporter = Arc::new(Mutex::new(exporter));

    let app = router::create_router(Arc::new(AppState::new(Arc::clone(&exporter))));
    let listener = tokio::net::TcpListener::bind(&config.daemon.bind)
        .await
        .wrap_err_with(|| format!("failed to bind {}", config.daemon.bind))?;
    info!(bind = %config.daemon.bind, "hostmetrics listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    match Arc::try_unwrap(exporter) {
        Ok(exporter) => exporter
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .close()?,
        Err(_) => warn!("exporter still referenced at shutdown, releasing on drop"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}

fn run_query(config: &Config, text: &str, namespace: Option<String>) -> Result<()> {
    let provider = factory::create_provider(config)?;
    let mut application = Application::initialize(provider)?;
    let mut session = application.new_session(Some(&config.mi.destination_options()))?;
    let namespace = namespace.map_or_else(|| config.mi.namespace(), Namespace::new);

    let mut operation = session
        .query_instances_text(OperationFlags::STANDARD_RTTI, &namespace, Dialect::Wql, text)
        .wrap_err_with(|| format!("query failed: {text}"))?;
    let mut instances = Vec::new();
    loop {
        let (instance, more) = operation.get_instance()?;
        instances.extend(instance);
        if !more {
            break;
        }
    }
    operation.close()?;
    session.close()?;
    application.close()?;

    println!("{}", serde_json::to_string_pretty(&instances)?);
    Ok(())
}

fn check(config: &Config) -> Result<()> {
    let provider = factory::create_provider(config)?;
    let mut application = Application::initialize(provider)?;
    let mut session = application
        .new_session(Some(&config.mi.destination_options()))
        .wrap_err("failed to open session")?;
    session.test_connection().wrap_err("test connection failed")?;
    session.close()?;
    application.close()?;

    println!("ok");
    Ok(())
}
