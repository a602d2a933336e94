//! Raw public key injection for providers that only accept registered keys.
//!
//! Creation runs as import, create, then removal of the imported key. The
//! removal always runs and its failure never replaces the create result.

use crate::authorized_keys::to_authorized_keys_format;
use crate::cleanup::{best_effort, CleanupReporter};
use crate::compute::{Instance, PublicKey};
use crate::error::{ComputeError, Result};
use crate::service::ComputeService;
use async_trait::async_trait;

/// Label applied to imported keys when the caller gives none.
pub const DEFAULT_KEY_LABEL: &str = "cloug";

/// Native key registry of a provider.
#[async_trait]
pub trait KeypairService: Send + Sync {
    /// Registers `key` (authorized_keys line) under `label`, returning the key handle.
    async fn import_public_key(&self, label: &str, key: &str) -> Result<String>;
    async fn remove_public_key(&self, key_id: &str) -> Result<()>;
}

/// Normalizes `key.key` and registers it, filling in the default label.
pub async fn import_public_key(keypairs: &dyn KeypairService, key: &PublicKey) -> Result<PublicKey> {
    if key.key.is_empty() {
        return Err(ComputeError::validation("public key material is empty"));
    }
    let normalized = to_authorized_keys_format(&key.key)?;
    let label = if key.label.is_empty() {
        DEFAULT_KEY_LABEL
    } else {
        key.label.as_str()
    };
    tracing::debug!("Importing public key with label {}", label);
    let id = keypairs.import_public_key(label, &normalized).await?;
    Ok(PublicKey {
        id,
        label: label.to_string(),
        key: normalized,
    })
}

/// Creates `instance` with its raw public key imported as a temporary
/// registered key.
///
/// Fails without side effects if the template already carries a key handle
/// or carries no key material.
pub async fn create_with_imported_key(
    service: &dyn ComputeService,
    keypairs: &dyn KeypairService,
    reporter: &dyn CleanupReporter,
    instance: &Instance,
) -> Result<Instance> {
    if !instance.public_key.id.is_empty() {
        return Err(ComputeError::validation(
            "public key already has an ID, nothing to import",
        ));
    }
    if instance.public_key.key.is_empty() {
        return Err(ComputeError::validation("public key material is empty"));
    }

    let imported = import_public_key(keypairs, &instance.public_key).await?;
    let mut template = instance.clone();
    template.public_key = imported.clone();

    let result = service.create_instance(&template).await;
    best_effort(
        reporter,
        "remove imported key",
        &imported.id,
        keypairs.remove_public_key(&imported.id),
    )
    .await;
    result
}
