use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::crypto::public_key_fingerprint;
use crate::error::{AuthError, Result};
use crate::keyvault::{KeyVault, VaultRecord};
use crate::locks::KeyLocks;
use crate::storage::{read_record, write_record, KeyValueStore, VAULT_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub public_key: String,
}

/// The only path that creates a vault record.
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn KeyValueStore>,
    key_vault: Arc<dyn KeyVault>,
    locks: KeyLocks,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn KeyValueStore>, key_vault: Arc<dyn KeyVault>) -> Self {
        Self {
            store,
            key_vault,
            locks: KeyLocks::new(),
        }
    }

    pub fn with_locks(mut self, locks: KeyLocks) -> Self {
        self.locks = locks;
        self
    }

    pub async fn register_extension(&self, password: &str, salt: &str) -> Result<Registration> {
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".into()));
        }
        let _guard = self.locks.lock(VAULT_KEY).await;
        if read_record::<VaultRecord>(self.store.as_ref(), VAULT_KEY)
            .await?
            .is_some()
        {
            return Err(AuthError::VaultExists);
        }

        let derived_key = self.key_vault.generate_derived_key(password, salt).await?;
        let (record, material) = self.key_vault.create(&derived_key, salt).await?;
        write_record(self.store.as_ref(), VAULT_KEY, &record).await?;

        let public_key = material.public_key().to_string();
        let fingerprint = general_purpose::STANDARD
            .decode(&public_key)
            .map(|bytes| public_key_fingerprint(&bytes))
            .unwrap_or_default();
        info!(fingerprint = %fingerprint, hd_path = material.hd_path(), "vault registered");
        Ok(Registration { public_key })
    }

    pub async fn is_registered(&self) -> Result<bool> {
        let found = self.store.get(&[VAULT_KEY]).await?;
        Ok(found.contains_key(VAULT_KEY))
    }
}
