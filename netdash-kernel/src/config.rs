use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub server: ServerConf,
    pub storage: StorageConf,
    pub sampler: SamplerConf,
    /// insère les deux appareils d'exemple si la table est vide
    pub seed_sample_devices: bool,
    /// header x-api-key exigé si défini
    pub api_key: Option<String>,
    /// décalage UTC (heures) pour l'heure de pointe ; sinon fuseau local
    pub utc_offset_hours: Option<i8>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConf {
    pub backend: StorageBackend,
    pub sqlite_path: PathBuf, // utilisé seulement par le backend sqlite
    pub retention_hours: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SamplerConf {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            server: ServerConf::default(),
            storage: StorageConf::default(),
            sampler: SamplerConf::default(),
            seed_sample_devices: true,
            api_key: None,
            utc_offset_hours: None,
        }
    }
}

impl Default for ServerConf {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 5000 }
    }
}

impl Default for StorageConf {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite_path: PathBuf::from("./data/netdash.db"),
            retention_hours: 24,
        }
    }
}

impl Default for SamplerConf {
    fn default() -> Self {
        Self { enabled: true, interval_secs: 5 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Parse un kernel.yaml ; un fichier vide donne la config par défaut
pub fn parse_config(txt: &str) -> Result<KernelConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    Ok(serde_yaml::from_str(txt)?)
}

/// Surcharges par variables d'environnement (après .env).
///
/// Chaque variable est appliquée indépendamment des autres ; la première
/// valeur invalide est renvoyée une fois toutes les autres appliquées.
pub fn apply_env_overrides<F>(cfg: &mut KernelConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut first_error = None;

    if let Some(key) = lookup("NETDASH_API_KEY").filter(|k| !k.is_empty()) {
        cfg.api_key = Some(key);
    }
    if let Some(port) = lookup("NETDASH_PORT") {
        let parsed = port.trim().parse::<u16>();
        match parsed {
            Ok(port) => cfg.server.port = port,
            Err(_) => first_error = first_error.or(Some(ConfigError::InvalidEnv { key: "NETDASH_PORT", value: port })),
        }
    }
    if let Some(path) = lookup("NETDASH_DATABASE_PATH").filter(|p| !p.is_empty()) {
        cfg.storage.backend = StorageBackend::Sqlite;
        cfg.storage.sqlite_path = PathBuf::from(path);
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Config effective : fichier YAML (optionnel) puis environnement.
/// Un fichier présent mais illisible, ou une variable invalide, empêche le démarrage.
pub async fn load_config() -> Result<KernelConfig, ConfigError> {
    let path = std::env::var("NETDASH_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        let cfg = parse_config(&txt)?;
        info!(%path, "config chargée");
        cfg
    } else {
        info!(%path, "pas de fichier de config, usage config par défaut");
        KernelConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}
