use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use qdispatch::storage::redact_url;
use qdispatch::{App, Role, Settings, WorkerRegistry, tasks};

/// Async task dispatch service
#[derive(Debug, Parser)]
#[command(name = "qdispatch", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API and the worker loops in one process
    Serve(Overrides),
    /// Run the HTTP API only
    Web(Overrides),
    /// Run the worker loops only
    Worker(Overrides),
}

/// Flags that take precedence over the environment
#[derive(Debug, Clone, Args)]
struct Overrides {
    /// Host/IP the HTTP API binds to
    #[arg(long)]
    host: Option<String>,

    /// Port the HTTP API listens on
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of worker loops
    #[arg(short, long)]
    workers: Option<usize>,
}

impl Overrides {
    fn apply(self, mut settings: Settings) -> anyhow::Result<Settings> {
        if let Some(host) = self.host {
            settings.host = host;
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(workers) = self.workers {
            anyhow::ensure!(workers > 0, "--workers must be at least 1");
            settings.workers = workers;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let dotenv = Settings::load_dotenv().context("Failed to load .env")?;
    let settings = Settings::from_env().context("Failed to load settings")?;
    let (role, overrides) = match cli.command {
        Command::Serve(overrides) => (Role::Serve, overrides),
        Command::Web(overrides) => (Role::Web, overrides),
        Command::Worker(overrides) => (Role::Worker, overrides),
    };
    let settings = overrides.apply(settings)?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("QDISPATCH_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    tracing::info!(
        ?role,
        broker = %redact_url(&settings.broker_url),
        result_backend = %redact_url(&settings.result_backend_url),
        "Starting qdispatch"
    );

    let mut registry = WorkerRegistry::new();
    tasks::register_builtin(&mut registry);

    let app = App::build(settings, registry)
        .await
        .context("Failed to build application")?;

    app.run(role, shutdown_signal()).await?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
