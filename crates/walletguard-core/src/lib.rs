//! walletguard-core: credential unlock, session lifecycle and per-origin
//! asset grants for the wallet extension.
//!
//! # Module layout
//! - `registration`: creates the encrypted vault record from a password + salt
//! - `unlocker`    : derives a key from a password and opens the vault record
//! - `session`     : the single active session and its two expiry clocks
//! - `grants`      : (domain, asset) visibility grants held by the session
//! - `keyvault`    : Argon2id / XChaCha20-Poly1305 vault record format
//! - `storage`     : key-value store collaborator (memory and JSON file)
//! - `service`     : `AuthService`, the components wired together

pub mod clock;
pub mod crypto;
pub mod error;
pub mod grants;
pub mod keyvault;
pub mod locks;
pub mod paths;
pub mod registration;
pub mod service;
pub mod session;
pub mod settings;
pub mod storage;
pub mod unlocker;

pub use error::{AuthError, ExpiryReason, PermissionError};
pub use grants::PermissionGrantStore;
pub use registration::{Registration, RegistrationService};
pub use service::AuthService;
pub use session::{Grant, Session, SessionManager};
pub use settings::AuthSettings;
pub use unlocker::CredentialUnlocker;
