/*!
Fixtures : corps de requête d'appareils et sampler déterministe
*/

use netdash_kernel::models::NewNetworkStats;
use netdash_kernel::sampler::MetricsSampler;
use serde_json::{json, Value};

/// Corps JSON minimal pour POST /api/devices
pub fn device_body(name: &str, ip: &str, mac: &str) -> Value {
    json!({
        "name": name,
        "ipAddress": ip,
        "macAddress": mac,
    })
}

/// Sampler qui renvoie toujours les mêmes mesures ; seul le nombre
/// d'appareils connectés suit le store.
#[derive(Debug, Clone)]
pub struct FixedSampler {
    pub download_speed: u64,
    pub upload_speed: u64,
    pub latency: u32,
}

impl Default for FixedSampler {
    fn default() -> Self {
        Self {
            download_speed: 150_000_000,
            upload_speed: 40_000_000,
            latency: 12,
        }
    }
}

impl MetricsSampler for FixedSampler {
    fn sample(&self, online_devices: u32) -> NewNetworkStats {
        NewNetworkStats {
            download_speed: self.download_speed,
            upload_speed: self.upload_speed,
            connected_devices: online_devices,
            latency: Some(self.latency),
            packet_loss: Some(0.5),
            signal_strength: Some(-60),
            network_load: Some(25.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_body_uses_wire_names() {
        let body = device_body("Test", "10.0.0.5", "AA:BB:CC:DD:EE:00");
        assert_eq!(body["ipAddress"], "10.0.0.5");
        assert_eq!(body["macAddress"], "AA:BB:CC:DD:EE:00");
        assert!(body.get("isBlocked").is_none());
    }

    #[test]
    fn fixed_sampler_tracks_online_count() {
        let s = FixedSampler::default().sample(4);
        assert_eq!(s.connected_devices, 4);
        assert_eq!(s.download_speed, 150_000_000);
    }
}
