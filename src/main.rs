use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::runtime::Handle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wx_retrieval::alert::{LogNotifier, Notifier, WebhookNotifier};
use wx_retrieval::config::Settings;
use wx_retrieval::control::{self, Command, ControlEndpoint};
use wx_retrieval::fetch::{Fetch, HttpFetcher};
use wx_retrieval::resource::{Resource, ResourceNumber};
use wx_retrieval::retrieval::RetrievalContext;
use wx_retrieval::scheduler::Scheduler;
use wx_retrieval::storage::{FileStorage, StorageSink};

/// Grace period for in-flight ticks at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "wx-retrieval", version, about = "Scheduled weather resource retrieval")]
struct Cli {
    /// Settings file (TOML).
    #[arg(short, long, global = true, env = "WX_RETRIEVAL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the retrieval service (default).
    Serve,
    /// Ask a running service to start or update a configured resource.
    Start {
        number: ResourceNumber,
        /// Control endpoint; defaults to `control_addr` from the settings.
        #[arg(long)]
        addr: Option<String>,
    },
    /// Ask a running service to stop a resource.
    Stop {
        number: ResourceNumber,
        #[arg(long)]
        addr: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wx_retrieval=info".parse()?))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match cli.command.unwrap_or(Cmd::Serve) {
        Cmd::Serve => serve(settings),
        Cmd::Start { number, addr } => remote(&settings, number, addr, Command::start),
        Cmd::Stop { number, addr } => remote(&settings, number, addr, Command::stop),
    }
}

fn remote(
    settings: &Settings,
    number: ResourceNumber,
    addr: Option<String>,
    build: fn(Resource) -> Command,
) -> Result<()> {
    let Some(resource) = settings.resource(number) else {
        bail!("resource {number} is not in the settings");
    };
    let command = build(resource.clone());
    let addr = addr.unwrap_or_else(|| settings.control_addr.clone());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(control::send_command(addr.as_str(), &command))?;
    println!("sent {:?} for resource {number} to {addr}", command.kind);
    Ok(())
}

fn serve(settings: Settings) -> Result<()> {
    // Blocking HTTP clients own an internal runtime; build them (and drop
    // them, below) outside of ours.
    let fetcher: Arc<dyn Fetch> = Arc::new(HttpFetcher::new(settings.read_timeout())?);
    let notifier: Arc<dyn Notifier> = match &settings.alert_webhook {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), settings.read_timeout())?),
        None => Arc::new(LogNotifier),
    };
    let storage: Arc<dyn StorageSink> = Arc::new(
        FileStorage::open(&settings.storage_root)
            .with_context(|| format!("opening storage at {}", settings.storage_root.display()))?,
    );

    let ctx = RetrievalContext {
        fetcher: fetcher.clone(),
        storage,
        notifier: notifier.clone(),
        thresholds: settings.alert_thresholds,
        daylight_offset_minutes: settings.daylight_offset_minutes,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(settings.core_pool_size.max(1))
        .thread_name("wx-retrieval")
        .build()?;

    let result = runtime.block_on(run(&settings, ctx));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    drop(fetcher);
    drop(notifier);
    result
}

async fn run(settings: &Settings, ctx: RetrievalContext) -> Result<()> {
    let scheduler = Arc::new(Scheduler::new(ctx, Handle::current()));

    let endpoint = match ControlEndpoint::bind(
        settings.control_addr.as_str(),
        scheduler.clone(),
        settings.control_workers,
        settings.read_timeout(),
    )
    .await
    {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!(addr = %settings.control_addr, "could not bind control endpoint: {e}");
            return Err(e).context("binding control endpoint");
        }
    };

    for resource in settings.resources.iter().filter(|r| r.active) {
        if let Err(e) = scheduler.start_or_update(resource.clone()) {
            error!(resource = resource.number, name = %resource.name, "configured resource not started: {e}");
        }
    }
    info!(
        configured = settings.resources.len(),
        scheduled = scheduler.len(),
        pool = settings.core_pool_size,
        "retrieval service started"
    );

    tokio::select! {
        () = endpoint.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for ctrl-c")?;
            info!("interrupt received, shutting down");
        }
    }

    scheduler.shutdown();
    Ok(())
}
