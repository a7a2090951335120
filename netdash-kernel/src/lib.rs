//! NetDash kernel - serveur du tableau de bord routeur.
//!
//! Le cœur est la couche `storage` (appareils + statistiques réseau avec
//! rétention glissante) ; `http` l'expose en REST, `ws` pousse les
//! marqueurs de changement, `sampler` alimente la série de stats.

pub mod clock;
pub mod config;
pub mod health;
pub mod http;
pub mod models;
pub mod notify;
pub mod sampler;
pub mod storage;
pub mod ws;
