use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{permission_error, AuthError, Result, StorageError, DOMAIN_NOT_GRANTED_ACCESS};
use crate::session::{Session, SessionManager};

/// Per-origin, per-asset visibility grants held by the active session.
#[derive(Clone)]
pub struct PermissionGrantStore {
    sessions: Arc<SessionManager>,
}

impl PermissionGrantStore {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    /// Re-authenticates with `password`, then grants `domain` visibility of
    /// `asset`. The new session keeps the grants of the previous session if
    /// that one is still valid.
    pub async fn enable_asset_for_domain(
        &self,
        password: &str,
        domain: &str,
        asset: &str,
    ) -> Result<Session> {
        require_non_empty("domain", domain)?;
        require_non_empty("asset", asset)?;

        let _guard = self.sessions.lock_session().await;
        let mut session = self.sessions.authenticate(password).await?;
        match self.sessions.validate_locked().await {
            Ok(previous) => session.grants = previous.grants,
            Err(AuthError::NoSession) | Err(AuthError::SessionExpired(_)) => {}
            Err(AuthError::Storage(StorageError::Corrupt { .. })) => {
                debug!("previous session record was unreadable; starting without grants");
            }
            Err(e) => return Err(e),
        }
        if !session.grant(domain, asset) {
            debug!(domain, asset, "asset already granted to domain");
        }
        self.sessions.persist_locked(&session).await?;
        info!(session_id = %session.id, domain, asset, "asset enabled for domain");
        Ok(session)
    }

    /// Succeeds only if the session is valid and `domain` was granted `asset`.
    pub async fn validate_domain_access(&self, domain: &str, asset: &str) -> Result<()> {
        let session = self.sessions.validate_session().await?;
        if session.has_grant(domain, asset) {
            return Ok(());
        }
        warn!(domain, asset, "domain has not been granted access to asset");
        Err(permission_error(DOMAIN_NOT_GRANTED_ACCESS, domain, asset).into())
    }

    pub async fn granted_assets(&self, domain: &str) -> Result<Vec<String>> {
        let session = self.sessions.validate_session().await?;
        Ok(session.assets_for(domain))
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AuthError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_inputs_are_rejected() {
        assert!(require_non_empty("domain", "https://example.com").is_ok());
        assert!(matches!(
            require_non_empty("asset", "   "),
            Err(AuthError::InvalidInput(_))
        ));
    }
}
