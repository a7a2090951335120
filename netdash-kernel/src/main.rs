/**
 * NETDASH KERNEL - Point d'entrée du serveur du tableau de bord
 *
 * RÔLE : Orchestration des modules : config, storage, sampler, HTTP/WebSocket.
 * Bootstrap complet avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : API REST + flux WebSocket de changements + échantillonnage périodique.
 */

use anyhow::{Context, Result};
use netdash_kernel::clock::{Clock, SystemClock};
use netdash_kernel::config::load_config;
use netdash_kernel::http::{self, AppState};
use netdash_kernel::notify::{BroadcastNotifier, Notifier};
use netdash_kernel::sampler::{spawn_stats_sampler, SyntheticSampler};
use netdash_kernel::storage::{open_storage, seed_sample_devices};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use time::UtcOffset;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // le décalage local doit être lu avant que le runtime ne lance ses threads
    let local_offset = UtcOffset::current_local_offset();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(run(local_offset))
}

async fn run(local_offset: Result<UtcOffset, time::error::IndeterminateOffset>) -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netdash_kernel=info")))
        .init();

    let cfg = load_config().await.context("invalid configuration")?;

    let offset = match cfg.utc_offset_hours {
        Some(hours) => UtcOffset::from_hms(hours, 0, 0).context("utc_offset_hours out of range")?,
        None => local_offset.unwrap_or_else(|_| {
            warn!("local UTC offset unavailable, peak hours computed in UTC (set utc_offset_hours)");
            UtcOffset::UTC
        }),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(offset));

    // stockage : choisi une seule fois au démarrage
    let storage = open_storage(&cfg.storage, clock).context("failed to open storage")?;
    if cfg.seed_sample_devices {
        seed_sample_devices(storage.as_ref()).context("failed to seed sample devices")?;
    }

    let notifier = BroadcastNotifier::new();

    // échantillonnage périodique des stats
    if cfg.sampler.enabled {
        let period = Duration::from_secs(cfg.sampler.interval_secs.max(1));
        let fanout: Arc<dyn Notifier> = Arc::new(notifier.clone());
        spawn_stats_sampler(storage.clone(), fanout, Arc::new(SyntheticSampler), period);
        info!(interval_secs = period.as_secs(), "stats sampler started");
    }

    let app_state = AppState::new(storage, notifier).with_api_key(cfg.api_key.clone());
    if app_state.api_key.is_some() {
        info!("api key required on all routes except /health");
    }

    // HTTP
    let app = http::build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.server.host, cfg.server.port))?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    info!("kernel stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
