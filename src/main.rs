use clap::{Parser, Subcommand};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ispnexus::config::AppConfig;
use ispnexus::db::enums::DeviceKind;
use ispnexus::db::schema::ensure_schema;
use ispnexus::db::{DbStore, DeviceRegistry, Settings, SubscriberRepository};
use ispnexus::ipam::IpamService;
use ispnexus::monitoring::MonitoringService;
use ispnexus::notifications::OperatorNotifier;
use ispnexus::orchestrator::{SubscriberOrchestrator, VendorDriverFactory, ZtpSweeper};
use ispnexus::radius::{DisconnectService, RadclientCoa, RadiusSynchronizer};
use ispnexus::router::{MikrotikRouter, RouterGateway};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the periodic ZTP sweep and fair-usage check until interrupted
    Run,
    /// Suspend a subscriber
    Isolate { subscriber_id: i32 },
    /// Lift a subscriber's suspension
    Restore { subscriber_id: i32 },
    /// Reset a subscriber's usage counter and throttle
    ResetFup { subscriber_id: i32 },
    /// Run one ZTP sweep and print the summary
    Sweep,
    /// Print the next free device address
    AllocateIp,
    /// Print aggregate monitoring stats for all active routers
    Stats,
    /// Create missing tables and indexes
    InitSchema,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "ispnexus.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(url.to_owned());
    opt.max_connections(10).sqlx_logging(false);
    Database::connect(opt).await
}

struct Services {
    store: Arc<DbStore>,
    router: Arc<dyn RouterGateway>,
    orchestrator: SubscriberOrchestrator,
    sweeper: Arc<ZtpSweeper>,
    ipam: IpamService,
}

fn build_services(config: &AppConfig, db: DatabaseConnection, radius_db: DatabaseConnection) -> Services {
    let store = Arc::new(DbStore::new(db));
    let settings = Settings::new(store.clone());
    let devices: Arc<dyn DeviceRegistry> = store.clone();
    let subscribers: Arc<dyn SubscriberRepository> = store.clone();
    let router: Arc<dyn RouterGateway> = Arc::new(MikrotikRouter::new(config.router_api.clone()));

    let radius = RadiusSynchronizer::new(radius_db, settings.clone());
    let disconnect = DisconnectService::new(
        devices.clone(),
        Arc::new(RadclientCoa::new(&config.coa)),
        settings.clone(),
        config.coa.port,
    );
    let orchestrator = SubscriberOrchestrator::new(
        subscribers,
        devices.clone(),
        router.clone(),
        radius,
        disconnect,
        settings.clone(),
    );
    let sweeper = Arc::new(ZtpSweeper::new(
        devices.clone(),
        orchestrator.clone(),
        Arc::new(VendorDriverFactory::new(config.router_api.timeout())),
        Arc::new(OperatorNotifier::new(config.notification_channels.clone())),
        config.ztp.sweep_concurrency,
    ));
    let ipam = IpamService::new(devices, settings);

    Services {
        store,
        router,
        orchestrator,
        sweeper,
        ipam,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_daemon(config: &AppConfig, services: Services) -> Result<(), BoxError> {
    let sweeper = services.sweeper.clone();
    let sweep_every = Duration::from_secs(config.ztp.sweep_interval_secs.max(1));
    let ztp_task = tokio::spawn(async move {
        let mut interval = interval(sweep_every);
        info!(interval_seconds = sweep_every.as_secs(), "ZTP sweep task started.");
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.sweep().await {
                error!(error = %e, "ZTP sweep failed.");
            }
        }
    });

    let orchestrator = services.orchestrator.clone();
    let fup_every = Duration::from_secs(config.fup.check_interval_secs.max(1));
    let fup_task = tokio::spawn(async move {
        let mut interval = interval(fup_every);
        info!(interval_seconds = fup_every.as_secs(), "Fair-usage check task started.");
        loop {
            interval.tick().await;
            if let Err(e) = orchestrator.run_fup_check().await {
                error!(error = %e, "Fair-usage check failed.");
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping background tasks.");
    ztp_task.abort();
    fup_task.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting ispnexus.");

    let db = connect(&config.database_url).await?;
    let radius_db = if config.radius_database_url() == config.database_url {
        db.clone()
    } else {
        connect(config.radius_database_url()).await?
    };

    if let Command::InitSchema = args.command {
        ensure_schema(&db).await?;
        if config.radius_database_url() != config.database_url {
            ensure_schema(&radius_db).await?;
        }
        info!("Schema ready.");
        return Ok(());
    }

    let services = build_services(&config, db, radius_db);
    match args.command {
        Command::Run => run_daemon(&config, services).await?,
        Command::Isolate { subscriber_id } => {
            print_json(&services.orchestrator.isolate(subscriber_id).await?)?;
        }
        Command::Restore { subscriber_id } => {
            print_json(&services.orchestrator.restore(subscriber_id).await?)?;
        }
        Command::ResetFup { subscriber_id } => {
            print_json(&services.orchestrator.reset_fup(subscriber_id).await?)?;
        }
        Command::Sweep => print_json(&services.sweeper.sweep().await?)?,
        Command::AllocateIp => match services.ipam.allocate_device_ip().await? {
            Some(ip) => println!("{ip}"),
            None => {
                let (root, prefix) = services.ipam.pool().await?;
                error!(root = %root, prefix = prefix, "IP pool exhausted.");
                return Err(format!("no free /{prefix} left in {root}").into());
            }
        },
        Command::Stats => {
            let routers = services.store.list_by_kind(DeviceKind::Router).await?;
            let monitoring = MonitoringService::new(
                services.router.clone(),
                Duration::from_secs(config.monitoring.cache_ttl_secs),
                config.router_api.timeout(),
                config.monitoring.concurrency,
            );
            print_json(&monitoring.aggregate(&routers).await)?;
        }
        Command::InitSchema => {}
    }
    Ok(())
}
