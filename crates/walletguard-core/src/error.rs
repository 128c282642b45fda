use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code carried by a [`PermissionError`] when an origin asks for an asset it
/// was never granted.
pub const DOMAIN_NOT_GRANTED_ACCESS: &str = "domain.not.grantedAccess.asset";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("The password does not unlock the vault")]
    InvalidCredentials,

    #[error("No active session, please login")]
    NoSession,

    #[error("{0}")]
    SessionExpired(ExpiryReason),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("No vault registered, please register the extension first")]
    VaultNotFound,

    #[error("A vault is already registered")]
    VaultExists,

    #[error("Key vault error: {0}")]
    KeyVault(#[from] CryptoError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Which of the two session clocks ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryReason {
    Inactive,
    Absolute,
}

impl std::fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpiryReason::Inactive => f.write_str("The session is no longer active please login"),
            ExpiryReason::Absolute => f.write_str("The session is > 21 days old please login"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOptions {
    pub domain: String,
    pub asset: String,
}

/// Structured permission failure handed to the UI layer for display.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("Permission denied ({code}): {} may not access {}", .message_options.domain, .message_options.asset)]
pub struct PermissionError {
    pub code: String,
    pub message_options: MessageOptions,
}

impl PermissionError {
    pub fn domain(&self) -> &str {
        &self.message_options.domain
    }

    pub fn asset(&self) -> &str {
        &self.message_options.asset
    }
}

pub fn permission_error(code: &str, domain: &str, asset: &str) -> PermissionError {
    PermissionError {
        code: code.to_string(),
        message_options: MessageOptions {
            domain: domain.to_string(),
            asset: asset.to_string(),
        },
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("AEAD encryption failed")]
    Encrypt,

    #[error("AEAD decryption failed (authentication tag mismatch)")]
    Decrypt,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Base64 decode error: {0}")]
    Encoding(#[from] base64::DecodeError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored record `{key}` is malformed: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_error_serializes_with_message_options() {
        let err = permission_error(DOMAIN_NOT_GRANTED_ACCESS, "https://google.com", "__asset_id_0");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "code": "domain.not.grantedAccess.asset",
                "messageOptions": {"domain": "https://google.com", "asset": "__asset_id_0"}
            })
        );
    }

    #[test]
    fn expiry_messages_name_the_clock() {
        assert_eq!(
            AuthError::SessionExpired(ExpiryReason::Inactive).to_string(),
            "The session is no longer active please login"
        );
        assert_eq!(
            AuthError::SessionExpired(ExpiryReason::Absolute).to_string(),
            "The session is > 21 days old please login"
        );
    }
}
