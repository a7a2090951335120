use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type DeviceId = i64;
pub type StatsId = i64;

/// Un client du réseau tel que vu par le routeur
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub ip_address: String,
    pub mac_address: String,
    pub is_blocked: bool,
    pub is_online: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
    pub download_usage: u64, // en octets
    pub upload_usage: u64,   // en octets
}

/// Corps accepté par POST /api/devices.
/// Les clés inconnues (downloadUsage, lastSeen...) sont ignorées.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub name: String,
    pub ip_address: String,
    pub mac_address: String,
    #[serde(default)]
    pub is_blocked: Option<bool>,
    #[serde(default)]
    pub is_online: Option<bool>,
}

impl NewDevice {
    pub fn new(name: impl Into<String>, ip_address: impl Into<String>, mac_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip_address: ip_address.into(),
            mac_address: mac_address.into(),
            is_blocked: None,
            is_online: None,
        }
    }

    /// Construit l'enregistrement complet : compteurs à zéro et lastSeen = création,
    /// quoi que l'appelant ait fourni.
    pub fn into_device(self, id: DeviceId, now: OffsetDateTime) -> Device {
        Device {
            id,
            name: self.name,
            ip_address: self.ip_address,
            mac_address: self.mac_address,
            is_blocked: self.is_blocked.unwrap_or(false),
            is_online: self.is_online.unwrap_or(true),
            last_seen: now,
            download_usage: 0,
            upload_usage: 0,
        }
    }
}

/// Mise à jour partielle (PATCH). L'identifiant n'en fait pas partie :
/// un `id` présent dans le corps est simplement ignoré.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_usage: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_usage: Option<u64>,
}

impl DevicePatch {
    pub fn blocked(is_blocked: bool) -> Self {
        Self { is_blocked: Some(is_blocked), ..Self::default() }
    }

    /// Fusion superficielle : les champs présents écrasent, les absents sont conservés.
    pub fn apply(self, device: &mut Device) {
        if let Some(name) = self.name { device.name = name; }
        if let Some(ip) = self.ip_address { device.ip_address = ip; }
        if let Some(mac) = self.mac_address { device.mac_address = mac; }
        if let Some(blocked) = self.is_blocked { device.is_blocked = blocked; }
        if let Some(online) = self.is_online { device.is_online = online; }
        if let Some(seen) = self.last_seen { device.last_seen = seen; }
        if let Some(down) = self.download_usage { device.download_usage = down; }
        if let Some(up) = self.upload_usage { device.upload_usage = up; }
    }
}

/// Échantillon de santé réseau
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub id: StatsId,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub download_speed: u64, // bits/s
    pub upload_speed: u64,   // bits/s
    pub connected_devices: u32,
    pub latency: u32,        // ms
    pub packet_loss: f64,    // %
    pub signal_strength: i32, // dBm
    pub network_load: f64,   // %
    pub peak_hour_usage: bool,
}

/// Mesures brutes fournies à add_stats. `timestamp` et `peakHourUsage`
/// ne sont jamais acceptés de l'appelant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNetworkStats {
    pub download_speed: u64,
    pub upload_speed: u64,
    pub connected_devices: u32,
    #[serde(default)]
    pub latency: Option<u32>,
    #[serde(default)]
    pub packet_loss: Option<f64>,
    #[serde(default)]
    pub signal_strength: Option<i32>,
    #[serde(default)]
    pub network_load: Option<f64>,
}

/// Point de départ quand aucune mesure n'existe encore (100 Mbit/s / 50 Mbit/s)
pub const BASELINE_DOWNLOAD_BPS: u64 = 100_000_000;
pub const BASELINE_UPLOAD_BPS: u64 = 50_000_000;

impl NewNetworkStats {
    pub fn baseline(connected_devices: u32) -> Self {
        Self {
            download_speed: BASELINE_DOWNLOAD_BPS,
            upload_speed: BASELINE_UPLOAD_BPS,
            connected_devices,
            ..Self::default()
        }
    }

    pub fn into_stats(self, id: StatsId, now: OffsetDateTime) -> NetworkStats {
        NetworkStats {
            id,
            timestamp: now,
            download_speed: self.download_speed,
            upload_speed: self.upload_speed,
            connected_devices: self.connected_devices,
            latency: self.latency.unwrap_or(0),
            packet_loss: self.packet_loss.unwrap_or(0.0),
            signal_strength: self.signal_strength.unwrap_or(0),
            network_load: self.network_load.unwrap_or(0.0),
            peak_hour_usage: is_peak_hour(now),
        }
    }
}

/// Heure de pointe : heure locale dans [19, 23]
pub fn is_peak_hour(ts: OffsetDateTime) -> bool {
    (19..=23).contains(&ts.hour())
}
