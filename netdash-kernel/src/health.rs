use crate::notify::BroadcastNotifier;
use crate::storage::{Storage, StorageResult};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub storage_backend: String,
    pub devices_tracked: u32,
    pub stats_retained: u32,
    pub ws_subscribers: u32,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn get_health(&self, storage: &dyn Storage, notifier: &BroadcastNotifier) -> StorageResult<KernelHealth> {
        let devices = storage.list_devices()?.len();
        let stats = storage.list_stats()?.len();

        Ok(KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            storage_backend: storage.backend().to_string(),
            devices_tracked: saturating_u32(devices),
            stats_retained: saturating_u32(stats),
            ws_subscribers: saturating_u32(notifier.subscriber_count()),
            memory_usage_mb: get_memory_usage_mb(),
        })
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            if let Some(mb) = parse_vm_rss_mb(&status) {
                return mb;
            }
        }
    }

    // pas de /proc : valeur inconnue
    0.0
}

fn parse_vm_rss_mb(status: &str) -> Option<f32> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb as f32 / 1024.0) // KB -> MB
}
