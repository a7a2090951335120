/**
 * STORE SQLITE - Variante relationnelle persistante
 *
 * Tables `devices` et `network_stats`, une colonne par attribut.
 * Identifiants AUTOINCREMENT (jamais réutilisés), timestamps en
 * nanosecondes Unix pour que la purge se fasse par simple comparaison.
 * Chaque opération composée tourne dans une transaction, sous le Mutex
 * de la connexion.
 */

use super::{
    check_storable, check_storable_stats, refreshed_last_seen, storable_count, storable_nanos, Storage, StorageError,
    StorageResult, DEFAULT_RETENTION,
};
use crate::clock::Clock;
use crate::models::{Device, DeviceId, DevicePatch, NetworkStats, NewDevice, NewNetworkStats};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS devices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    ip_address TEXT NOT NULL,
    mac_address TEXT NOT NULL,
    is_blocked INTEGER NOT NULL DEFAULT 0,
    is_online INTEGER NOT NULL DEFAULT 1,
    last_seen INTEGER NOT NULL,
    download_usage INTEGER NOT NULL DEFAULT 0,
    upload_usage INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS network_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    download_speed INTEGER NOT NULL,
    upload_speed INTEGER NOT NULL,
    connected_devices INTEGER NOT NULL,
    latency INTEGER NOT NULL DEFAULT 0,
    packet_loss REAL NOT NULL DEFAULT 0,
    signal_strength INTEGER NOT NULL DEFAULT 0,
    network_load REAL NOT NULL DEFAULT 0,
    peak_hour_usage INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS network_stats_timestamp ON network_stats (timestamp);
";

const DEVICE_COLUMNS: &str =
    "id, name, ip_address, mac_address, is_blocked, is_online, last_seen, download_usage, upload_usage";
const STATS_COLUMNS: &str = "id, timestamp, download_speed, upload_speed, connected_devices, latency, \
     packet_loss, signal_strength, network_load, peak_hour_usage";

/// Les lignes sont relues dans le fuseau de l'horloge du store
fn from_nanos(nanos: i64, like: OffsetDateTime) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .map(|ts| ts.to_offset(like.offset()))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Integer, Box::new(e)))
}

/// Colonne INTEGER relue en compteur ; une valeur négative est une ligne corrompue
fn count_from_sql(idx: usize, value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e)))
}

fn device_from_row(row: &Row<'_>, now: OffsetDateTime) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        name: row.get(1)?,
        ip_address: row.get(2)?,
        mac_address: row.get(3)?,
        is_blocked: row.get(4)?,
        is_online: row.get(5)?,
        last_seen: from_nanos(row.get(6)?, now)?,
        download_usage: count_from_sql(7, row.get(7)?)?,
        upload_usage: count_from_sql(8, row.get(8)?)?,
    })
}

fn stats_from_row(row: &Row<'_>, now: OffsetDateTime) -> rusqlite::Result<NetworkStats> {
    Ok(NetworkStats {
        id: row.get(0)?,
        timestamp: from_nanos(row.get(1)?, now)?,
        download_speed: count_from_sql(2, row.get(2)?)?,
        upload_speed: count_from_sql(3, row.get(3)?)?,
        connected_devices: row.get(4)?,
        latency: row.get(5)?,
        packet_loss: row.get(6)?,
        signal_strength: row.get(7)?,
        network_load: row.get(8)?,
        peak_hour_usage: row.get(9)?,
    })
}

fn select_device(conn: &Connection, id: DeviceId, now: OffsetDateTime) -> rusqlite::Result<Option<Device>> {
    conn.query_row(
        &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?1"),
        params![id],
        |row| device_from_row(row, now),
    )
    .optional()
}

fn write_device(conn: &Connection, device: &Device) -> StorageResult<()> {
    check_storable(device)?;
    conn.execute(
        "UPDATE devices SET name = ?2, ip_address = ?3, mac_address = ?4, is_blocked = ?5,
             is_online = ?6, last_seen = ?7, download_usage = ?8, upload_usage = ?9
         WHERE id = ?1",
        params![
            device.id,
            device.name,
            device.ip_address,
            device.mac_address,
            device.is_blocked,
            device.is_online,
            storable_nanos("lastSeen", device.last_seen)?,
            storable_count("downloadUsage", device.download_usage)?,
            storable_count("uploadUsage", device.upload_usage)?,
        ],
    )?;
    Ok(())
}

/// Insertion + purge dans la transaction de l'appelant
fn insert_stats(conn: &Connection, input: NewNetworkStats, now: OffsetDateTime, retention: Duration) -> StorageResult<NetworkStats> {
    // l'id est attribué par SQLite, on construit l'enregistrement après coup
    let draft = input.into_stats(0, now);
    check_storable_stats(&draft)?;
    conn.execute(
        "INSERT INTO network_stats (timestamp, download_speed, upload_speed, connected_devices,
             latency, packet_loss, signal_strength, network_load, peak_hour_usage)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            storable_nanos("timestamp", draft.timestamp)?,
            storable_count("downloadSpeed", draft.download_speed)?,
            storable_count("uploadSpeed", draft.upload_speed)?,
            draft.connected_devices,
            draft.latency,
            draft.packet_loss,
            draft.signal_strength,
            draft.network_load,
            draft.peak_hour_usage,
        ],
    )?;
    let stats = NetworkStats { id: conn.last_insert_rowid(), ..draft };

    let pruned = conn.execute(
        "DELETE FROM network_stats WHERE timestamp < ?1",
        params![storable_nanos("cutoff", now - retention)?],
    )?;
    if pruned > 0 {
        debug!(pruned, "pruned expired network stats");
    }
    Ok(stats)
}

pub struct SqliteStorage {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        Self::from_connection(Connection::open(path)?, clock)
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, clock)
    }

    fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
            retention: DEFAULT_RETENTION,
        })
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

impl Storage for SqliteStorage {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn list_devices(&self) -> StorageResult<Vec<Device>> {
        let conn = self.conn.lock();
        let now = self.clock.now();
        let mut stmt = conn.prepare(&format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY id"))?;
        let devices = stmt
            .query_map([], |row| device_from_row(row, now))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(devices)
    }

    fn get_device(&self, id: DeviceId) -> StorageResult<Option<Device>> {
        let conn = self.conn.lock();
        let now = self.clock.now();
        Ok(select_device(&conn, id, now)?)
    }

    fn create_device(&self, input: NewDevice) -> StorageResult<Device> {
        let conn = self.conn.lock();
        let now = self.clock.now();
        let draft = input.into_device(0, now);
        conn.execute(
            "INSERT INTO devices (name, ip_address, mac_address, is_blocked, is_online,
                 last_seen, download_usage, upload_usage)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0)",
            params![
                draft.name,
                draft.ip_address,
                draft.mac_address,
                draft.is_blocked,
                draft.is_online,
                storable_nanos("lastSeen", draft.last_seen)?,
            ],
        )?;
        let device = Device { id: conn.last_insert_rowid(), ..draft };
        debug!(id = device.id, name = %device.name, "device created");
        Ok(device)
    }

    fn update_device(&self, id: DeviceId, patch: DevicePatch) -> StorageResult<Device> {
        let mut conn = self.conn.lock();
        let now = self.clock.now();
        let tx = conn.transaction()?;
        let mut device = select_device(&tx, id, now)?.ok_or(StorageError::NotFound(id))?;
        patch.apply(&mut device);
        write_device(&tx, &device)?;
        tx.commit()?;
        Ok(device)
    }

    fn toggle_block(&self, id: DeviceId) -> StorageResult<Device> {
        let mut conn = self.conn.lock();
        let now = self.clock.now();
        let tx = conn.transaction()?;
        let mut device = select_device(&tx, id, now)?.ok_or(StorageError::NotFound(id))?;
        device.is_blocked = !device.is_blocked;
        device.last_seen = refreshed_last_seen(device.last_seen, now);
        write_device(&tx, &device)?;
        tx.commit()?;
        Ok(device)
    }

    fn latest_or_baseline(&self) -> StorageResult<(NetworkStats, bool)> {
        let mut conn = self.conn.lock();
        let now = self.clock.now();
        let tx = conn.transaction()?;

        let latest = tx
            .query_row(
                &format!("SELECT {STATS_COLUMNS} FROM network_stats ORDER BY timestamp DESC, id DESC LIMIT 1"),
                [],
                |row| stats_from_row(row, now),
            )
            .optional()?;

        let latest = match latest {
            Some(stats) => (stats, false),
            None => {
                let count: i64 = tx.query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
                let connected = u32::try_from(count).unwrap_or(u32::MAX);
                debug!("no stats yet, synthesizing baseline sample");
                (insert_stats(&tx, NewNetworkStats::baseline(connected), now, self.retention)?, true)
            }
        };
        tx.commit()?;
        Ok(latest)
    }

    fn add_stats(&self, input: NewNetworkStats) -> StorageResult<NetworkStats> {
        let mut conn = self.conn.lock();
        let now = self.clock.now();
        let tx = conn.transaction()?;
        let stats = insert_stats(&tx, input, now, self.retention)?;
        tx.commit()?;
        Ok(stats)
    }

    fn list_stats(&self) -> StorageResult<Vec<NetworkStats>> {
        let conn = self.conn.lock();
        let now = self.clock.now();
        let mut stmt = conn.prepare(&format!("SELECT {STATS_COLUMNS} FROM network_stats ORDER BY timestamp, id"))?;
        let stats = stmt
            .query_map([], |row| stats_from_row(row, now))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }
}
