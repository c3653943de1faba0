//! berthloadd - The berthload service
//!
//! This is the main entry point for the berthload service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization and seeding
//! - Session store and token issuer
//! - Access gate and request engine
//! - HTTP server

use anyhow::{Context, Result};
use berthload_auth::{AccessGate, AccountSpec, TokenIssuer};
use berthload_config::{load_config, Settings};
use berthload_http::{AppState, HttpServer};
use berthload_store::{AuditEvent, AuditEventType, MemorySessionStore, SqliteStore, Store};
use berthload_util::{default_config_path, DATABASE_FILENAME};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// How often expired session entries are swept
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// berthloadd - Shipping request service
#[derive(clap::Parser, Debug)]
#[command(name = "berthloadd")]
#[command(about = "Shipping request and loading-time service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/berthload/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Listen address override (or set BERTHLOAD_BIND env var)
    #[arg(short, long, env = "BERTHLOAD_BIND")]
    bind: Option<SocketAddr>,

    /// Data directory override (or set BERTHLOAD_DATA_DIR env var)
    #[arg(short, long, env = "BERTHLOAD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    bind: SocketAddr,
    gate: Arc<AccessGate>,
    store: Arc<dyn Store>,
    sessions: Arc<MemorySessionStore>,
    cookie_name: String,
    session_ttl: Duration,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        // Load configuration
        let settings = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            moderators = settings.moderators.len(),
            seed_ships = settings.ships.len(),
            "Configuration loaded"
        );

        let bind = args.bind.unwrap_or(settings.server.bind);
        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.server.data_dir.clone());

        // Create data directory
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        // Initialize store
        let db_path = data_dir.join(DATABASE_FILENAME);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        // Log service start
        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let sessions = Arc::new(MemorySessionStore::new());
        let issuer = TokenIssuer::new(settings.auth.signing_key.as_bytes(), settings.auth.session_ttl);
        let gate = Arc::new(AccessGate::new(store.clone(), sessions.clone(), issuer));

        seed(&gate, store.as_ref(), &settings)?;

        Ok(Self {
            bind,
            gate,
            store,
            sessions,
            cookie_name: settings.auth.cookie_name.clone(),
            session_ttl: settings.auth.session_ttl,
        })
    }

    async fn run(self) -> Result<()> {
        let state = AppState::new(self.gate.clone(), &self.cookie_name, self.session_ttl);
        let server = HttpServer::bind(self.bind, state)
            .await
            .with_context(|| format!("Failed to start HTTP server on {}", self.bind))?;

        // Sweep expired sessions in the background
        let sessions = self.sessions.clone();
        let sweeper = tokio::spawn(async move {
            let mut timer = tokio::time::interval(SESSION_SWEEP_INTERVAL);
            loop {
                timer.tick().await;
                match sessions.purge_expired() {
                    Ok(removed) if removed > 0 => debug!(removed, "Expired sessions swept"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Session sweep failed"),
                }
            }
        });

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let shutdown = async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
        };

        info!("Service running");
        server.serve(shutdown).await?;

        // Graceful shutdown
        info!("Shutting down berthloadd");
        sweeper.abort();

        // Log shutdown
        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Create missing moderator accounts and fill an empty ship catalog
fn seed(gate: &AccessGate, store: &dyn Store, settings: &Settings) -> Result<()> {
    for account in &settings.moderators {
        let created = gate
            .ensure_account(&AccountSpec {
                login: &account.login,
                password: &account.password,
                full_name: &account.full_name,
                contacts: &account.contacts,
                role: berthload_api::Role::Moderator,
            })
            .with_context(|| format!("Failed to seed moderator '{}'", account.login))?;
        if created {
            info!(login = %account.login, "Moderator account created");
        }
    }

    if settings.ships.is_empty() {
        return Ok(());
    }
    if store.count_ships()? > 0 {
        debug!("Ship catalog already populated, skipping seed");
        return Ok(());
    }
    for spec in &settings.ships {
        store
            .create_ship(spec)
            .with_context(|| format!("Failed to seed ship '{}'", spec.name))?;
    }
    info!(count = settings.ships.len(), "Ship catalog seeded");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = <Args as clap::Parser>::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "berthloadd starting");

    // Create and run the service
    let service = Service::new(&args)?;
    service.run().await
}
