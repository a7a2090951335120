/**
 * SAMPLER - Échantillonnage périodique des statistiques réseau
 *
 * La source de mesures est un trait (MetricsSampler) : le générateur
 * synthétique sert pour la démo, une vraie sonde peut le remplacer.
 * Le fan-out est non bloquant, un abonné lent ne retarde jamais le tick suivant.
 */

use crate::models::{NetworkStats, NewNetworkStats};
use crate::notify::Notifier;
use crate::storage::{Storage, StorageResult};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub trait MetricsSampler: Send + Sync {
    fn sample(&self, online_devices: u32) -> NewNetworkStats;
}

/// Mesures aléatoires plausibles pour la démo
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticSampler;

impl MetricsSampler for SyntheticSampler {
    fn sample(&self, online_devices: u32) -> NewNetworkStats {
        let mut rng = rand::thread_rng();
        NewNetworkStats {
            download_speed: rng.gen_range(0..200_000_000), // 0-200 Mbps
            upload_speed: rng.gen_range(0..100_000_000),   // 0-100 Mbps
            connected_devices: online_devices,
            latency: Some(rng.gen_range(5..55)),
            packet_loss: Some(rng.gen_range(0.0..2.0)),
            signal_strength: Some(-rng.gen_range(50..=80)),
            network_load: Some(rng.gen_range(0.0..100.0)),
        }
    }
}

/// Un tick : compte les appareils en ligne, insère, annonce
pub fn sample_once(storage: &dyn Storage, notifier: &dyn Notifier, sampler: &dyn MetricsSampler) -> StorageResult<NetworkStats> {
    let online = storage.list_devices()?.iter().filter(|d| d.is_online).count();
    let input = sampler.sample(u32::try_from(online).unwrap_or(u32::MAX));
    let stats = storage.add_stats(input)?;
    notifier.publish_change();
    Ok(stats)
}

pub fn spawn_stats_sampler(
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
    sampler: Arc<dyn MetricsSampler>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match sample_once(storage.as_ref(), notifier.as_ref(), sampler.as_ref()) {
                Ok(stats) => debug!(id = stats.id, download = stats.download_speed, "stats sampled"),
                Err(e) => warn!(error = %e, "stats sampling failed"),
            }
        }
    })
}
