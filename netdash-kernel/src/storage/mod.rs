/**
 * STORAGE - Couche de données du tableau de bord (appareils + statistiques réseau)
 *
 * RÔLE :
 * Seul propriétaire des deux collections du système. Les routes REST et
 * l'échantillonneur passent exclusivement par le trait `Storage`.
 *
 * FONCTIONNEMENT :
 * - Storage trait = jeu d'opérations commun (list/get/create/update/toggle, stats)
 * - MemStorage = HashMap en mémoire derrière un seul Mutex
 * - SqliteStorage = variante relationnelle (tables devices / network_stats)
 * - Choix du backend une seule fois au démarrage (open_storage)
 *
 * INVARIANTS :
 * - identifiants croissants, jamais réutilisés
 * - compteurs d'usage à 0 et lastSeen = maintenant à la création
 * - timestamp et peakHourUsage des stats toujours calculés par le store
 * - chaque insertion de stats purge tout ce qui est plus vieux que now - rétention
 */

pub mod memory;
pub mod sqlite;

pub use memory::MemStorage;
pub use sqlite::SqliteStorage;

use crate::clock::Clock;
use crate::config::{StorageBackend, StorageConf};
use crate::models::{Device, DeviceId, DevicePatch, NetworkStats, NewDevice, NewNetworkStats};
use std::sync::Arc;
use time::Duration;
use tracing::info;

/// Fenêtre de rétention par défaut des statistiques
pub const DEFAULT_RETENTION: Duration = Duration::hours(24);

/// Erreurs remontées par les backends
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Device not found: {0}")]
    NotFound(DeviceId),
    /// valeur hors de ce que le store sait conserver fidèlement
    #[error("Invalid value: {0}")]
    Invalid(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Unavailable(e.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Interface commune aux deux backends. Chaque opération s'exécute
/// entièrement sous le verrou du store : pas d'entrelacement possible
/// entre insertion et purge.
pub trait Storage: Send + Sync {
    /// Nom du backend ("memory", "sqlite")
    fn backend(&self) -> &'static str;

    /// Tous les appareils, par ordre d'insertion
    fn list_devices(&self) -> StorageResult<Vec<Device>>;

    /// `Ok(None)` si l'identifiant est inconnu
    fn get_device(&self, id: DeviceId) -> StorageResult<Option<Device>>;

    fn create_device(&self, input: NewDevice) -> StorageResult<Device>;

    /// Fusion superficielle ; `NotFound` si l'appareil n'existe pas
    fn update_device(&self, id: DeviceId, patch: DevicePatch) -> StorageResult<Device>;

    /// Inverse isBlocked et rafraîchit lastSeen (jamais en arrière)
    fn toggle_block(&self, id: DeviceId) -> StorageResult<Device>;

    /// Dernier échantillon ; synthétise et insère une base si la série est vide.
    /// Le booléen indique si cette base vient d'être insérée.
    fn latest_or_baseline(&self) -> StorageResult<(NetworkStats, bool)>;

    fn latest_stats(&self) -> StorageResult<NetworkStats> {
        self.latest_or_baseline().map(|(stats, _)| stats)
    }

    /// Ajoute un échantillon puis purge la fenêtre de rétention
    fn add_stats(&self, input: NewNetworkStats) -> StorageResult<NetworkStats>;

    /// Échantillons retenus, du plus ancien au plus récent
    fn list_stats(&self) -> StorageResult<Vec<NetworkStats>>;
}

/// lastSeen après un toggle : maintenant, sans jamais reculer
pub(crate) fn refreshed_last_seen(previous: time::OffsetDateTime, now: time::OffsetDateTime) -> time::OffsetDateTime {
    if now > previous { now } else { previous }
}

/// Compteur u64 tel qu'il sera stocké (colonne INTEGER signée)
pub(crate) fn storable_count(field: &str, value: u64) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::Invalid(format!("{field} out of range: {value}")))
}

/// Timestamp en nanosecondes Unix ; i64 couvre 1677..2262
pub(crate) fn storable_nanos(field: &str, ts: time::OffsetDateTime) -> StorageResult<i64> {
    i64::try_from(ts.unix_timestamp_nanos()).map_err(|_| StorageError::Invalid(format!("{field} out of range: {ts}")))
}

/// Un appareil ne s'écrit que si tous ses champs se relisent à l'identique
pub(crate) fn check_storable(device: &Device) -> StorageResult<()> {
    storable_count("downloadUsage", device.download_usage)?;
    storable_count("uploadUsage", device.upload_usage)?;
    storable_nanos("lastSeen", device.last_seen)?;
    Ok(())
}

pub(crate) fn check_storable_stats(stats: &NetworkStats) -> StorageResult<()> {
    storable_count("downloadSpeed", stats.download_speed)?;
    storable_count("uploadSpeed", stats.upload_speed)?;
    storable_nanos("timestamp", stats.timestamp)?;
    Ok(())
}

/// Ouvre le backend choisi par la config
pub fn open_storage(conf: &StorageConf, clock: Arc<dyn Clock>) -> StorageResult<Arc<dyn Storage>> {
    let retention = Duration::hours(i64::from(conf.retention_hours));
    match conf.backend {
        StorageBackend::Memory => {
            info!(retention_hours = conf.retention_hours, "using in-memory storage");
            Ok(Arc::new(MemStorage::new(clock).with_retention(retention)))
        }
        StorageBackend::Sqlite => {
            if let Some(parent) = conf.sqlite_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StorageError::Unavailable(format!("cannot create {}: {e}", parent.display())))?;
                }
            }
            info!(path = %conf.sqlite_path.display(), retention_hours = conf.retention_hours, "using sqlite storage");
            Ok(Arc::new(SqliteStorage::open(&conf.sqlite_path, clock)?.with_retention(retention)))
        }
    }
}

/// Appareils d'exemple insérés au premier démarrage
pub fn seed_sample_devices(storage: &dyn Storage) -> StorageResult<usize> {
    if !storage.list_devices()?.is_empty() {
        return Ok(0);
    }

    let samples = [
        NewDevice {
            is_blocked: Some(false),
            is_online: Some(true),
            ..NewDevice::new("iPhone 13", "192.168.1.100", "00:11:22:33:44:55")
        },
        NewDevice {
            is_blocked: Some(false),
            is_online: Some(true),
            ..NewDevice::new("MacBook Pro", "192.168.1.101", "AA:BB:CC:DD:EE:FF")
        },
    ];
    let count = samples.len();
    for device in samples {
        storage.create_device(device)?;
    }
    info!(count, "seeded sample devices");
    Ok(count)
}
