/*!
# NetDash DevKit - Stubs et utilitaires de test

Bibliothèque facilitant les tests du kernel avec:
- Notifier d'enregistrement (compte les annonces de changement)
- Sampler déterministe et fixtures d'appareils
- Harness qui démarre le vrai routeur sur un port éphémère
*/

pub mod notifier_stub;
pub mod fixtures;
pub mod test_utils;

pub use notifier_stub::RecordingNotifier;
pub use fixtures::{device_body, FixedSampler};
pub use test_utils::{Reply, TestHarness};
