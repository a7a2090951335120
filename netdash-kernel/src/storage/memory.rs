/**
 * STORE MÉMOIRE - Backend par défaut du tableau de bord
 *
 * Deux HashMap indexées par identifiant, deux compteurs, un seul Mutex.
 * Toute opération (y compris insertion + purge des stats) se fait sous
 * le même verrou : aucune insertion concurrente ne peut s'intercaler.
 */

use super::{
    check_storable, check_storable_stats, refreshed_last_seen, Storage, StorageError, StorageResult, DEFAULT_RETENTION,
};
use crate::clock::Clock;
use crate::models::{Device, DeviceId, DevicePatch, NetworkStats, NewDevice, NewNetworkStats, StatsId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use time::Duration;
use tracing::debug;

struct Inner {
    devices: HashMap<DeviceId, Device>,
    stats: HashMap<StatsId, NetworkStats>,
    next_device_id: DeviceId,
    next_stats_id: StatsId,
}

impl Inner {
    fn insert_stats(&mut self, input: NewNetworkStats, clock: &dyn Clock, retention: Duration) -> StorageResult<NetworkStats> {
        let now = clock.now();
        let id = self.next_stats_id;
        let stats = input.into_stats(id, now);
        check_storable_stats(&stats)?;
        self.next_stats_id += 1;

        self.stats.insert(id, stats.clone());

        let cutoff = now - retention;
        let before = self.stats.len();
        self.stats.retain(|_, s| s.timestamp >= cutoff);
        let pruned = before - self.stats.len();
        if pruned > 0 {
            debug!(pruned, "pruned expired network stats");
        }
        Ok(stats)
    }
}

pub struct MemStorage {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl MemStorage {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                devices: HashMap::new(),
                stats: HashMap::new(),
                next_device_id: 1,
                next_stats_id: 1,
            }),
            clock,
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

impl Storage for MemStorage {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn list_devices(&self) -> StorageResult<Vec<Device>> {
        let inner = self.inner.lock();
        let mut devices: Vec<Device> = inner.devices.values().cloned().collect();
        // ids croissants = ordre d'insertion
        devices.sort_by_key(|d| d.id);
        Ok(devices)
    }

    fn get_device(&self, id: DeviceId) -> StorageResult<Option<Device>> {
        Ok(self.inner.lock().devices.get(&id).cloned())
    }

    fn create_device(&self, input: NewDevice) -> StorageResult<Device> {
        let mut inner = self.inner.lock();
        let id = inner.next_device_id;
        inner.next_device_id += 1;

        let device = input.into_device(id, self.clock.now());
        inner.devices.insert(id, device.clone());
        debug!(id, name = %device.name, "device created");
        Ok(device)
    }

    fn update_device(&self, id: DeviceId, patch: DevicePatch) -> StorageResult<Device> {
        let mut inner = self.inner.lock();
        let device = inner.devices.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        // appliqué sur une copie : un patch refusé ne laisse aucune trace
        let mut updated = device.clone();
        patch.apply(&mut updated);
        check_storable(&updated)?;
        *device = updated.clone();
        Ok(updated)
    }

    fn toggle_block(&self, id: DeviceId) -> StorageResult<Device> {
        let mut inner = self.inner.lock();
        let now = self.clock.now();
        let device = inner.devices.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        device.is_blocked = !device.is_blocked;
        device.last_seen = refreshed_last_seen(device.last_seen, now);
        Ok(device.clone())
    }

    fn latest_or_baseline(&self) -> StorageResult<(NetworkStats, bool)> {
        let mut inner = self.inner.lock();
        let latest = inner
            .stats
            .values()
            .max_by_key(|s| (s.timestamp, s.id))
            .cloned();

        match latest {
            Some(stats) => Ok((stats, false)),
            None => {
                let connected = u32::try_from(inner.devices.len()).unwrap_or(u32::MAX);
                debug!("no stats yet, synthesizing baseline sample");
                let baseline = inner.insert_stats(NewNetworkStats::baseline(connected), self.clock.as_ref(), self.retention)?;
                Ok((baseline, true))
            }
        }
    }

    fn add_stats(&self, input: NewNetworkStats) -> StorageResult<NetworkStats> {
        let mut inner = self.inner.lock();
        inner.insert_stats(input, self.clock.as_ref(), self.retention)
    }

    fn list_stats(&self) -> StorageResult<Vec<NetworkStats>> {
        let inner = self.inner.lock();
        let mut stats: Vec<NetworkStats> = inner.stats.values().cloned().collect();
        stats.sort_by_key(|s| (s.timestamp, s.id));
        Ok(stats)
    }
}
