//! Gateway worker
//!
//! Runs the background job queue, keeps gateway certificates renewed and
//! deployed, and serves the operational HTTP surface.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gateway_worker_cert::{
    parse_leaf, AcmeAuthority, AcmeConfig, Certificate, CertificateManager,
    CertificateRenewalHandler, CertificateStore, CertificateType, CertificateValidationHandler,
    CertificateValidator, GatewayDistributor, Http01ChallengeStore, InMemoryCertificateStore,
    LifecycleConfig, RenewalAuthority, SelfSignedAuthority, X509Validator,
};
use gateway_worker_db::{DatabaseCleanupHandler, SeaOrmCertificateStore, SeaOrmJobHistory};
use gateway_worker_gateway::{
    ConfigUpdateHandler, GatewayInstance, GatewayRegistry, GatewayTransport, HttpGatewayTransport,
    HttpTransportConfig,
};
use gateway_worker_health::{build_router, AppState, Readiness};
use gateway_worker_queue::{
    InMemoryJobHistory, JobHistory, JobQueue, JobType, QueueConfig, ShutdownOutcome,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_COUNT,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GATEWAY_WORKER_GIT_HASH"),
    ")"
);

/// Gateway worker - certificate lifecycle and background jobs for Gateway instances
#[derive(Parser, Debug)]
#[command(name = "gateway-worker")]
#[command(version = VERSION)]
struct Cli {
    /// Address of the health / jobs / ACME challenge HTTP surface
    #[arg(long, env = "WORKER_HTTP_ADDR", default_value = "0.0.0.0:8081")]
    http_addr: SocketAddr,

    /// Database URL (postgres:// or sqlite://). In-memory storage when unset
    #[arg(long, env = "WORKER_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Maximum number of queued jobs
    #[arg(long, env = "WORKER_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Number of concurrent workers
    #[arg(long, env = "WORKER_POOL_SIZE", default_value_t = DEFAULT_WORKER_COUNT)]
    workers: usize,

    /// Seconds between certificate expiry sweeps
    #[arg(
        long,
        env = "WORKER_SWEEP_INTERVAL_SECS",
        default_value = "86400",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    sweep_interval_secs: u64,

    /// Seconds in-flight jobs get to finish at shutdown
    #[arg(long, env = "WORKER_SHUTDOWN_GRACE_SECS", default_value = "30")]
    shutdown_grace_secs: u64,

    /// Retry budget of renewal jobs dispatched by the sweep
    #[arg(long, env = "WORKER_RENEWAL_MAX_RETRIES", default_value = "3")]
    renewal_max_retries: u32,

    /// Gateway instance as `id=address` or `address` (repeatable)
    #[arg(
        long = "gateway-instance",
        env = "WORKER_GATEWAY_INSTANCES",
        value_delimiter = ','
    )]
    gateway_instances: Vec<GatewayInstance>,

    /// Per-request timeout when pushing to a gateway instance
    #[arg(long, env = "WORKER_PUSH_TIMEOUT_SECS", default_value = "10")]
    push_timeout_secs: u64,

    /// Certificate authority used for renewals
    #[arg(long, env = "WORKER_AUTHORITY", value_enum, default_value_t = AuthorityKind::Acme)]
    authority: AuthorityKind,

    /// Contact email for the ACME account (required with --authority acme)
    #[arg(long, env = "WORKER_ACME_EMAIL")]
    acme_email: Option<String>,

    /// Use the Let's Encrypt staging directory
    #[arg(long, env = "WORKER_ACME_STAGING")]
    acme_staging: bool,

    /// Custom ACME directory URL
    #[arg(long, env = "WORKER_ACME_DIRECTORY")]
    acme_directory: Option<String>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate operator-provided PEM files and write them to the store
    #[command(long_about = r#"
Load a certificate chain and private key from PEM files, validate them against
the domain and write them to the configured database. The sweep keeps the
certificate renewed from then on.

EXAMPLES:
  gateway-worker --database-url sqlite://./worker.db?mode=rwc \
    import-certificate --domain api.example.com \
    --cert ./api.example.com.crt --key ./api.example.com.key
    "#)]
    ImportCertificate {
        #[arg(long)]
        domain: String,

        /// PEM certificate chain, leaf first
        #[arg(long)]
        cert: PathBuf,

        /// PEM private key
        #[arg(long)]
        key: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AuthorityKind {
    /// Let's Encrypt (or another ACME directory)
    Acme,
    /// Self-signed development certificates
    SelfSigned,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

/// Database-backed store and history when a URL is configured
struct Persistence {
    store: Arc<dyn CertificateStore>,
    history: Arc<dyn JobHistory>,
    sql_history: Option<Arc<SeaOrmJobHistory>>,
}

async fn open_persistence(database_url: Option<&str>) -> Result<Persistence> {
    match database_url {
        Some(url) => {
            let db = gateway_worker_db::connect(url)
                .await
                .context("Failed to connect to database")?;
            gateway_worker_db::migrate(&db)
                .await
                .context("Failed to run database migrations")?;

            let history = Arc::new(SeaOrmJobHistory::new(db.clone()));
            Ok(Persistence {
                store: Arc::new(SeaOrmCertificateStore::new(db)),
                history: history.clone(),
                sql_history: Some(history),
            })
        }
        None => {
            warn!("No database configured; certificates and job history are kept in memory");
            Ok(Persistence {
                store: Arc::new(InMemoryCertificateStore::new()),
                history: Arc::new(InMemoryJobHistory::new()),
                sql_history: None,
            })
        }
    }
}

fn build_authority(
    cli: &Cli,
    challenges: &Http01ChallengeStore,
) -> Result<Arc<dyn RenewalAuthority>> {
    match cli.authority {
        AuthorityKind::Acme => {
            let config = AcmeConfig {
                contact_email: cli.acme_email.clone().unwrap_or_default(),
                use_staging: cli.acme_staging,
                directory_url: cli.acme_directory.clone(),
                ..Default::default()
            };
            info!("ACME directory: {}", config.directory());

            let authority = AcmeAuthority::new(config, challenges.clone())
                .context("ACME authority requires --acme-email")?;
            Ok(Arc::new(authority))
        }
        AuthorityKind::SelfSigned => {
            warn!("Using self-signed development authority; certificates are not publicly trusted");
            Ok(Arc::new(SelfSignedAuthority::new()))
        }
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            _ = sigint.recv() => info!("Received Ctrl+C, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    info!(
        version = VERSION,
        built = env!("GATEWAY_WORKER_BUILD_TIME"),
        "Gateway worker starting..."
    );

    let persistence = open_persistence(cli.database_url.as_deref()).await?;

    let queue = JobQueue::new(
        QueueConfig {
            capacity: cli.queue_capacity,
            workers: cli.workers,
        },
        persistence.history.clone(),
    );

    let registry = GatewayRegistry::from_instances(cli.gateway_instances.clone());
    if registry.is_empty() {
        warn!("No gateway instances configured; deployments will reach nobody");
    }
    let transport: Arc<dyn GatewayTransport> = Arc::new(
        HttpGatewayTransport::new(HttpTransportConfig {
            timeout: Duration::from_secs(cli.push_timeout_secs),
        })
        .context("Failed to create gateway transport")?,
    );

    let challenges = Http01ChallengeStore::new();
    let authority = build_authority(&cli, &challenges)?;
    let validator: Arc<dyn CertificateValidator> = Arc::new(X509Validator::new());

    let manager = Arc::new(CertificateManager::new(
        persistence.store.clone(),
        validator.clone(),
        authority,
        Arc::new(GatewayDistributor::new(registry.clone(), transport.clone())),
        queue.clone(),
        LifecycleConfig {
            sweep_interval: Duration::from_secs(cli.sweep_interval_secs),
            renewal_max_retries: cli.renewal_max_retries,
            ..Default::default()
        },
    ));

    queue.register_handler(
        JobType::CertificateRenewal,
        Arc::new(CertificateRenewalHandler::new(manager.clone())),
    );
    queue.register_handler(
        JobType::CertificateValidation,
        Arc::new(CertificateValidationHandler::new(
            persistence.store.clone(),
            validator,
        )),
    );
    queue.register_handler(
        JobType::ConfigUpdate,
        Arc::new(ConfigUpdateHandler::new(registry, transport)),
    );
    if let Some(history) = persistence.sql_history.clone() {
        queue.register_handler(
            JobType::DatabaseCleanup,
            Arc::new(DatabaseCleanupHandler::new(history)),
        );
    }

    let listener = tokio::net::TcpListener::bind(cli.http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP surface on {}", cli.http_addr))?;

    let cancel = CancellationToken::new();
    let readiness = Readiness::new();

    let pool = queue.start(cancel.child_token());

    let monitor = {
        let manager = manager.clone();
        let token = cancel.child_token();
        tokio::spawn(async move { manager.run_monitor(token).await })
    };

    let state = Arc::new(AppState::new(
        queue.clone(),
        manager.clone(),
        challenges,
        readiness.clone(),
    ));
    let http = tokio::spawn(gateway_worker_health::serve(
        listener,
        build_router(state),
        cancel.child_token(),
    ));

    readiness.set_ready(true);
    info!(
        workers = pool.worker_count(),
        queue_capacity = cli.queue_capacity,
        sweep_interval_secs = cli.sweep_interval_secs,
        "Gateway worker running"
    );

    wait_for_shutdown_signal().await?;

    readiness.set_ready(false);
    cancel.cancel();

    let grace = Duration::from_secs(cli.shutdown_grace_secs);
    if let ShutdownOutcome::TimedOut { aborted } = pool.shutdown(grace).await {
        let abandoned = manager.abandon_in_flight();
        warn!(
            aborted,
            abandoned = abandoned.len(),
            "Workers aborted before finishing"
        );
    }

    if let Err(e) = monitor.await {
        error!("Certificate monitor task failed: {}", e);
    }
    match http.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP surface error: {}", e),
        Err(e) => error!("HTTP surface task failed: {}", e),
    }

    info!("Gateway worker stopped");
    Ok(())
}

async fn import_certificate(
    database_url: Option<&str>,
    domain: &str,
    cert_path: &Path,
    key_path: &Path,
) -> Result<()> {
    let database_url = database_url
        .context("import-certificate needs --database-url; the in-memory store would be lost")?;

    let certificate_pem = tokio::fs::read_to_string(cert_path)
        .await
        .with_context(|| format!("Failed to read certificate {}", cert_path.display()))?;
    let private_key_pem = tokio::fs::read_to_string(key_path)
        .await
        .with_context(|| format!("Failed to read private key {}", key_path.display()))?;

    let leaf = parse_leaf(&certificate_pem).context("Failed to parse certificate")?;
    let cert = Certificate::new(
        domain,
        certificate_pem,
        private_key_pem,
        leaf.not_after,
        CertificateType::Production,
    );
    X509Validator::new()
        .validate(&cert)
        .context("Certificate failed validation")?;

    let persistence = open_persistence(Some(database_url)).await?;
    persistence
        .store
        .store(&cert)
        .await
        .context("Failed to store certificate")?;

    info!(
        domain = %domain,
        expires_at = %cert.expires_at,
        names = ?leaf.names,
        "Imported certificate"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command.take() {
        Some(Commands::ImportCertificate { domain, cert, key }) => {
            import_certificate(cli.database_url.as_deref(), &domain, &cert, &key).await
        }
        None => run(cli).await,
    }
}
