use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{AuthError, CryptoError, Result};
use crate::keyvault::{DerivedKey, KeyMaterial, KeyVault, VaultRecord};
use crate::storage::{read_record, KeyValueStore, VAULT_KEY};

/// Turns a password into unlocked key material, or nothing at all.
#[derive(Clone)]
pub struct CredentialUnlocker {
    key_vault: Arc<dyn KeyVault>,
}

impl CredentialUnlocker {
    pub fn new(key_vault: Arc<dyn KeyVault>) -> Self {
        Self { key_vault }
    }

    pub async fn derive_key(&self, password: &str, salt: &str) -> Result<DerivedKey> {
        Ok(self.key_vault.generate_derived_key(password, salt).await?)
    }

    pub async fn unlock(&self, record: &VaultRecord, derived_key: &DerivedKey) -> Result<KeyMaterial> {
        let material = match self.key_vault.deserialize(record, derived_key).await {
            Ok(material) => material,
            Err(CryptoError::KeyDerivation(reason)) => {
                return Err(AuthError::KeyVault(CryptoError::KeyDerivation(reason)))
            }
            Err(e) => {
                warn!(error = %e, "vault record did not open with the supplied key");
                return Err(AuthError::InvalidCredentials);
            }
        };
        if !material.is_derived_key_correct(derived_key) {
            warn!("derived key failed the vault correctness check");
            return Err(AuthError::InvalidCredentials);
        }
        debug!(hd_path = material.hd_path(), "vault unlocked");
        Ok(material)
    }

    /// Reads the stored vault record and unlocks it with `password`.
    pub(crate) async fn unlock_stored(
        &self,
        store: &dyn KeyValueStore,
        password: &str,
    ) -> Result<(DerivedKey, KeyMaterial)> {
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".into()));
        }
        let record: VaultRecord = read_record(store, VAULT_KEY)
            .await?
            .ok_or(AuthError::VaultNotFound)?;
        let derived_key = self.derive_key(password, &record.salt).await?;
        let material = self.unlock(&record, &derived_key).await?;
        Ok((derived_key, material))
    }
}
