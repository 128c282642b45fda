use std::sync::Arc;

use crate::clock::Clock;
use crate::error::Result;
use crate::grants::PermissionGrantStore;
use crate::keyvault::{Argon2KeyVault, KeyVault};
use crate::locks::KeyLocks;
use crate::registration::{Registration, RegistrationService};
use crate::session::{Session, SessionManager};
use crate::settings::AuthSettings;
use crate::storage::KeyValueStore;

/// The four auth components wired over one store and one key vault.
#[derive(Clone)]
pub struct AuthService {
    registration: RegistrationService,
    sessions: Arc<SessionManager>,
    grants: PermissionGrantStore,
}

impl AuthService {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: &AuthSettings) -> Self {
        let key_vault: Arc<dyn KeyVault> = Arc::new(Argon2KeyVault::new(settings.kdf.clone()));
        Self::with_key_vault(store, key_vault, settings, None)
    }

    pub fn with_key_vault(
        store: Arc<dyn KeyValueStore>,
        key_vault: Arc<dyn KeyVault>,
        settings: &AuthSettings,
        clock: Option<Arc<dyn Clock>>,
    ) -> Self {
        let locks = KeyLocks::new();
        let mut sessions = SessionManager::new(store.clone(), key_vault.clone(), settings.session.clone())
            .with_locks(locks.clone());
        if let Some(clock) = clock {
            sessions = sessions.with_clock(clock);
        }
        let sessions = Arc::new(sessions);
        Self {
            registration: RegistrationService::new(store, key_vault).with_locks(locks),
            grants: PermissionGrantStore::new(sessions.clone()),
            sessions,
        }
    }

    pub fn registration(&self) -> &RegistrationService {
        &self.registration
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn grants(&self) -> &PermissionGrantStore {
        &self.grants
    }

    pub async fn register_extension(&self, password: &str, salt: &str) -> Result<Registration> {
        self.registration.register_extension(password, salt).await
    }

    pub async fn login(&self, password: &str, domain: &str) -> Result<Session> {
        self.sessions.login(password, domain).await
    }

    pub async fn validate_session(&self) -> Result<Session> {
        self.sessions.validate_session().await
    }

    pub async fn logout(&self) -> Result<()> {
        self.sessions.logout().await
    }

    pub async fn enable_asset_for_domain(
        &self,
        password: &str,
        domain: &str,
        asset: &str,
    ) -> Result<Session> {
        self.grants.enable_asset_for_domain(password, domain, asset).await
    }

    pub async fn validate_domain_access(&self, domain: &str, asset: &str) -> Result<()> {
        self.grants.validate_domain_access(domain, asset).await
    }
}
