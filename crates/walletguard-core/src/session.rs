//! Session lifecycle.
//!
//! There is at most one session, persisted under the `session` key. It is
//! valid only while both clocks hold:
//!
//! - inactivity: `now - lastActive <= inactivity_timeout` (7 days by default)
//! - absolute:   `now - createdAt  <= max_session_age`    (21 days by default)
//!
//! A session that fails either check is deleted before the failure is
//! returned, so it cannot be picked up again.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{AuthError, ExpiryReason, Result, StorageError};
use crate::keyvault::{DerivedKey, KeyVault};
use crate::locks::KeyLocks;
use crate::settings::SessionPolicy;
use crate::storage::{read_record, write_record, KeyValueStore, SESSION_KEY};
use crate::unlocker::CredentialUnlocker;

/// An origin's permission to see one asset's balance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub domain: String,
    pub asset: String,
}

impl Grant {
    pub fn new(domain: &str, asset: &str) -> Self {
        Self {
            domain: domain.to_string(),
            asset: asset.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_active: DateTime<Utc>,
    #[serde(rename = "pwDerivedKey")]
    derived_key: DerivedKey,
    #[serde(default)]
    pub grants: BTreeSet<Grant>,
}

impl Session {
    pub fn new(derived_key: DerivedKey, now: DateTime<Utc>) -> Self {
        let now = now.trunc_subsecs(3);
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_active: now,
            derived_key,
            grants: BTreeSet::new(),
        }
    }

    pub fn derived_key(&self) -> &DerivedKey {
        &self.derived_key
    }

    pub fn has_grant(&self, domain: &str, asset: &str) -> bool {
        self.grants.contains(&Grant::new(domain, asset))
    }

    /// Returns `false` when the pair was already granted.
    pub fn grant(&mut self, domain: &str, asset: &str) -> bool {
        self.grants.insert(Grant::new(domain, asset))
    }

    pub fn assets_for(&self, domain: &str) -> Vec<String> {
        self.grants
            .iter()
            .filter(|g| g.domain == domain)
            .map(|g| g.asset.clone())
            .collect()
    }

    /// First clock that has run out at `now`, inactivity checked first.
    pub fn expiry(&self, policy: &SessionPolicy, now: DateTime<Utc>) -> Option<ExpiryReason> {
        if now.signed_duration_since(self.last_active) > policy.inactivity_timeout() {
            return Some(ExpiryReason::Inactive);
        }
        if now.signed_duration_since(self.created_at) > policy.max_session_age() {
            return Some(ExpiryReason::Absolute);
        }
        None
    }
}

/// Single-slot holder for the active session.
#[async_trait]
pub trait SessionSlot: Send + Sync {
    async fn get(&self) -> std::result::Result<Option<Session>, StorageError>;
    async fn set(&self, session: &Session) -> std::result::Result<(), StorageError>;
    async fn clear(&self) -> std::result::Result<(), StorageError>;
}

/// Session slot kept under the `session` key of the shared store.
pub struct StoredSessionSlot {
    store: Arc<dyn KeyValueStore>,
}

impl StoredSessionSlot {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionSlot for StoredSessionSlot {
    async fn get(&self) -> std::result::Result<Option<Session>, StorageError> {
        read_record(self.store.as_ref(), SESSION_KEY).await
    }

    async fn set(&self, session: &Session) -> std::result::Result<(), StorageError> {
        write_record(self.store.as_ref(), SESSION_KEY, session).await
    }

    async fn clear(&self) -> std::result::Result<(), StorageError> {
        self.store.remove(&[SESSION_KEY]).await
    }
}

pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    slot: Arc<dyn SessionSlot>,
    unlocker: CredentialUnlocker,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
    locks: KeyLocks,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        key_vault: Arc<dyn KeyVault>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            slot: Arc::new(StoredSessionSlot::new(store.clone())),
            store,
            unlocker: CredentialUnlocker::new(key_vault),
            clock: Arc::new(SystemClock),
            policy,
            locks: KeyLocks::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_session_slot(mut self, slot: Arc<dyn SessionSlot>) -> Self {
        self.slot = slot;
        self
    }

    pub fn with_locks(mut self, locks: KeyLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Unlocks the vault with `password` and replaces any existing session
    /// with a fresh one carrying no grants.
    ///
    /// `domain` names the requesting origin for the audit trail only; login
    /// itself is not origin-scoped.
    pub async fn login(&self, password: &str, domain: &str) -> Result<Session> {
        let _guard = self.lock_session().await;
        let session = self.authenticate(password).await?;
        self.slot.set(&session).await?;
        info!(session_id = %session.id, domain, "session created");
        Ok(session)
    }

    pub async fn validate_session(&self) -> Result<Session> {
        let _guard = self.lock_session().await;
        self.validate_locked().await
    }

    /// Deletes the session. Succeeds when there is none.
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.lock_session().await;
        self.slot.clear().await?;
        info!("session cleared");
        Ok(())
    }

    /// Records use of a valid session by moving `lastActive` to now.
    /// `createdAt` is left alone, so the absolute ceiling still applies.
    pub async fn touch(&self) -> Result<Session> {
        let _guard = self.lock_session().await;
        let mut session = self.validate_locked().await?;
        session.last_active = self.now();
        self.slot.set(&session).await?;
        debug!(session_id = %session.id, "session touched");
        Ok(session)
    }

    /// Stored session without any clock checks.
    pub async fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.slot.get().await?)
    }

    pub(crate) async fn lock_session(&self) -> OwnedMutexGuard<()> {
        self.locks.lock(SESSION_KEY).await
    }

    /// Full credential check producing a new, unsaved session.
    pub(crate) async fn authenticate(&self, password: &str) -> Result<Session> {
        let (derived_key, _material) = self
            .unlocker
            .unlock_stored(self.store.as_ref(), password)
            .await?;
        Ok(Session::new(derived_key, self.now()))
    }

    pub(crate) async fn persist_locked(&self, session: &Session) -> Result<()> {
        self.slot.set(session).await?;
        Ok(())
    }

    /// Caller must hold the session lock.
    pub(crate) async fn validate_locked(&self) -> Result<Session> {
        let session = match self.slot.get().await {
            Ok(Some(session)) => session,
            Ok(None) => return Err(AuthError::NoSession),
            Err(e @ StorageError::Corrupt { .. }) => {
                warn!(error = %e, "discarding unreadable session record");
                self.slot.clear().await?;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(reason) = session.expiry(&self.policy, self.now()) {
            self.slot.clear().await?;
            warn!(session_id = %session.id, ?reason, "session expired");
            return Err(AuthError::SessionExpired(reason));
        }
        debug!(session_id = %session.id, "session valid");
        Ok(session)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_at(created: DateTime<Utc>, last_active: DateTime<Utc>) -> Session {
        let mut session = Session::new(DerivedKey::from_bytes([3u8; 32]), created);
        session.last_active = last_active.trunc_subsecs(3);
        session
    }

    #[test]
    fn inactivity_is_checked_before_age() {
        let now = Utc::now().trunc_subsecs(3);
        let policy = SessionPolicy::default();
        let both = session_at(now - Duration::days(30), now - Duration::days(8));
        assert_eq!(both.expiry(&policy, now), Some(ExpiryReason::Inactive));
    }

    #[test]
    fn old_but_active_session_hits_absolute_ceiling() {
        let now = Utc::now().trunc_subsecs(3);
        let policy = SessionPolicy::default();
        let old = session_at(now - Duration::days(22), now);
        assert_eq!(old.expiry(&policy, now), Some(ExpiryReason::Absolute));
    }

    #[test]
    fn limits_are_inclusive() {
        let now = Utc::now().trunc_subsecs(3);
        let policy = SessionPolicy::default();
        let edge = session_at(now - Duration::days(21), now - Duration::days(7));
        assert_eq!(edge.expiry(&policy, now), None);
        let past = session_at(now - Duration::days(21), now - Duration::days(7) - Duration::milliseconds(1));
        assert_eq!(past.expiry(&policy, now), Some(ExpiryReason::Inactive));
    }

    #[test]
    fn grants_are_a_set_of_pairs() {
        let mut session = session_at(Utc::now(), Utc::now());
        assert!(session.grant("https://example.com", "asset-0"));
        assert!(!session.grant("https://example.com", "asset-0"));
        assert!(session.grant("https://other.com", "asset-0"));
        assert_eq!(session.grants.len(), 2);
        assert!(session.has_grant("https://example.com", "asset-0"));
        assert!(!session.has_grant("https://example.com", "asset-1"));
        assert_eq!(session.assets_for("https://other.com"), vec!["asset-0".to_string()]);
    }

    #[test]
    fn session_record_uses_millisecond_timestamps() {
        let session = session_at(Utc::now(), Utc::now());
        let value = serde_json::to_value(&session).unwrap();
        assert!(value["createdAt"].is_i64());
        assert!(value["lastActive"].is_i64());
        assert!(value["pwDerivedKey"].is_string());
        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }
}
