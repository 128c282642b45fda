//! Key vault: password stretching and the encrypted vault record.
//!
//! The vault record only ever holds ciphertext. Each secret is sealed with
//! XChaCha20-Poly1305 under the password-derived key, with its own random
//! nonce and a field label as associated data so blobs cannot be swapped
//! between fields.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{self, DERIVED_KEY_LEN, NONCE_LEN};
use crate::error::CryptoError;
use crate::settings::KdfSettings;

pub const DEFAULT_HD_PATH: &str = "m/0'/0'/0'";

const SEED_AAD: &[u8] = b"walletguard/seed";
const HD_ROOT_AAD: &[u8] = b"walletguard/hd-root";
const PRIVACY_AAD: &[u8] = b"walletguard/privacy-key";

/// Key stretched from the user's password. Never written to the vault record.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; DERIVED_KEY_LEN]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; DERIVED_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

impl Serialize for DerivedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(general_purpose::STANDARD.encode(self.0));
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for DerivedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = Zeroizing::new(String::deserialize(deserializer)?);
        let bytes = Zeroizing::new(
            general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(<D::Error as serde::de::Error>::custom)?,
        );
        let key: [u8; DERIVED_KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| <D::Error as serde::de::Error>::custom("derived key must be 32 bytes"))?;
        Ok(Self(key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlob {
    pub enc_str: String,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyKeys {
    pub public_key: String,
    pub enc_priv_key: EncryptedBlob,
}

/// Persisted vault record. Holds no plaintext secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultRecord {
    pub enc_seed: EncryptedBlob,
    pub enc_hd_root_priv: EncryptedBlob,
    pub hd_path_string: String,
    pub salt: String,
    pub hd_index: u32,
    pub privacy_keys: PrivacyKeys,
}

/// Decrypted wallet secrets, held only while an unlock is in progress.
#[derive(ZeroizeOnDrop)]
pub struct KeyMaterial {
    seed: Vec<u8>,
    hd_root_private: [u8; 32],
    privacy_secret: [u8; 32],
    #[zeroize(skip)]
    hd_path: String,
    #[zeroize(skip)]
    hd_index: u32,
    #[zeroize(skip)]
    public_key: String,
    #[zeroize(skip)]
    seed_marker: EncryptedBlob,
}

impl KeyMaterial {
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn hd_path(&self) -> &str {
        &self.hd_path
    }

    pub fn hd_index(&self) -> u32 {
        self.hd_index
    }

    pub fn hd_root_private(&self) -> &[u8; 32] {
        &self.hd_root_private
    }

    /// Checks the correctness marker laid down at registration: the sealed
    /// seed must open under `key` to the seed held here, and the privacy
    /// secret must still match the published public key.
    pub fn is_derived_key_correct(&self, key: &DerivedKey) -> bool {
        let seed_matches = match open(key, &self.seed_marker, SEED_AAD) {
            Ok(seed) => seed.as_slice() == self.seed.as_slice(),
            Err(_) => false,
        };
        let secret = StaticSecret::from(self.privacy_secret);
        let public = general_purpose::STANDARD.encode(PublicKey::from(&secret).as_bytes());
        seed_matches && public == self.public_key
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("hd_path", &self.hd_path)
            .field("hd_index", &self.hd_index)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait KeyVault: Send + Sync {
    /// Deterministic and deliberately slow.
    async fn generate_derived_key(&self, password: &str, salt: &str)
        -> Result<DerivedKey, CryptoError>;

    /// Generates fresh wallet secrets and seals them under `derived_key`.
    async fn create(
        &self,
        derived_key: &DerivedKey,
        salt: &str,
    ) -> Result<(VaultRecord, KeyMaterial), CryptoError>;

    async fn deserialize(
        &self,
        record: &VaultRecord,
        derived_key: &DerivedKey,
    ) -> Result<KeyMaterial, CryptoError>;
}

/// Argon2id + XChaCha20-Poly1305 key vault with an X25519 privacy key pair.
#[derive(Debug, Clone, Default)]
pub struct Argon2KeyVault {
    kdf: KdfSettings,
}

impl Argon2KeyVault {
    pub fn new(kdf: KdfSettings) -> Self {
        Self { kdf }
    }
}

#[async_trait]
impl KeyVault for Argon2KeyVault {
    async fn generate_derived_key(
        &self,
        password: &str,
        salt: &str,
    ) -> Result<DerivedKey, CryptoError> {
        // Argon2 wants at least 8 salt bytes; the salt string itself may be any length.
        let salt_digest = Sha256::digest(salt.as_bytes());
        let key = crypto::derive_key(password, &salt_digest, &self.kdf)?;
        Ok(DerivedKey(*key))
    }

    async fn create(
        &self,
        derived_key: &DerivedKey,
        salt: &str,
    ) -> Result<(VaultRecord, KeyMaterial), CryptoError> {
        let seed = crypto::generate_seed();
        let hd_root = crypto::derive_hd_root(&seed[..], DEFAULT_HD_PATH)?;
        let privacy = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public_key = general_purpose::STANDARD.encode(PublicKey::from(&privacy).as_bytes());
        let privacy_bytes = Zeroizing::new(privacy.to_bytes());

        let enc_seed = seal(derived_key, &seed[..], SEED_AAD)?;
        let record = VaultRecord {
            enc_seed: enc_seed.clone(),
            enc_hd_root_priv: seal(derived_key, &hd_root[..], HD_ROOT_AAD)?,
            hd_path_string: DEFAULT_HD_PATH.to_string(),
            salt: salt.to_string(),
            hd_index: 0,
            privacy_keys: PrivacyKeys {
                public_key: public_key.clone(),
                enc_priv_key: seal(derived_key, &privacy_bytes[..], PRIVACY_AAD)?,
            },
        };
        let material = KeyMaterial {
            seed: seed.to_vec(),
            hd_root_private: *hd_root,
            privacy_secret: *privacy_bytes,
            hd_path: DEFAULT_HD_PATH.to_string(),
            hd_index: 0,
            public_key,
            seed_marker: enc_seed,
        };
        Ok((record, material))
    }

    async fn deserialize(
        &self,
        record: &VaultRecord,
        derived_key: &DerivedKey,
    ) -> Result<KeyMaterial, CryptoError> {
        let seed = open(derived_key, &record.enc_seed, SEED_AAD)?;
        let hd_root = open(derived_key, &record.enc_hd_root_priv, HD_ROOT_AAD)?;
        let privacy = open(derived_key, &record.privacy_keys.enc_priv_key, PRIVACY_AAD)?;
        Ok(KeyMaterial {
            seed: seed.to_vec(),
            hd_root_private: to_key32(&hd_root, "hd root private key")?,
            privacy_secret: to_key32(&privacy, "privacy private key")?,
            hd_path: record.hd_path_string.clone(),
            hd_index: record.hd_index,
            public_key: record.privacy_keys.public_key.clone(),
            seed_marker: record.enc_seed.clone(),
        })
    }
}

fn seal(key: &DerivedKey, plaintext: &[u8], aad: &[u8]) -> Result<EncryptedBlob, CryptoError> {
    let nonce = crypto::generate_nonce();
    let ciphertext = crypto::encrypt(key.as_bytes(), &nonce, plaintext, aad)?;
    Ok(EncryptedBlob {
        enc_str: general_purpose::STANDARD.encode(ciphertext),
        nonce: general_purpose::STANDARD.encode(nonce),
    })
}

fn open(key: &DerivedKey, blob: &EncryptedBlob, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let nonce_bytes = general_purpose::STANDARD.decode(&blob.nonce)?;
    let nonce: [u8; NONCE_LEN] = nonce_bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(format!("nonce must be {NONCE_LEN} bytes")))?;
    let ciphertext = general_purpose::STANDARD.decode(&blob.enc_str)?;
    crypto::decrypt(key.as_bytes(), &nonce, &ciphertext, aad)
}

fn to_key32(bytes: &[u8], what: &str) -> Result<[u8; 32], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(format!("{what} must be 32 bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> Argon2KeyVault {
        Argon2KeyVault::new(KdfSettings {
            memory_cost_kib: 256,
            time_cost: 1,
            parallelism: 1,
        })
    }

    #[tokio::test]
    async fn created_record_unlocks_with_same_password() {
        let kv = vault();
        let key = kv.generate_derived_key("password", "saltypretzel").await.unwrap();
        let (record, created) = kv.create(&key, "saltypretzel").await.unwrap();
        assert!(created.is_derived_key_correct(&key));

        let again = kv.generate_derived_key("password", &record.salt).await.unwrap();
        let material = kv.deserialize(&record, &again).await.unwrap();
        assert!(material.is_derived_key_correct(&again));
        assert_eq!(material.public_key(), created.public_key());
        assert_eq!(material.hd_root_private(), created.hd_root_private());
        assert_eq!(material.hd_path(), DEFAULT_HD_PATH);
    }

    #[tokio::test]
    async fn wrong_password_cannot_open_record() {
        let kv = vault();
        let key = kv.generate_derived_key("password", "saltypretzel").await.unwrap();
        let (record, created) = kv.create(&key, "saltypretzel").await.unwrap();
        let wrong = kv.generate_derived_key("hunter2", "saltypretzel").await.unwrap();
        assert!(matches!(
            kv.deserialize(&record, &wrong).await,
            Err(CryptoError::Decrypt)
        ));
        assert!(!created.is_derived_key_correct(&wrong));
    }

    #[tokio::test]
    async fn record_round_trips_with_camel_case_fields() {
        let kv = vault();
        let key = kv.generate_derived_key("password", "strangeSalt").await.unwrap();
        let (record, _) = kv.create(&key, "strangeSalt").await.unwrap();
        let value = serde_json::to_value(&record).unwrap();
        for field in ["encSeed", "encHdRootPriv", "hdPathString", "salt", "hdIndex", "privacyKeys"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert!(value["privacyKeys"]["encPrivKey"]["encStr"].is_string());
        let back: VaultRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn swapped_blobs_are_rejected() {
        let kv = vault();
        let key = kv.generate_derived_key("password", "strangeSalt").await.unwrap();
        let (mut record, _) = kv.create(&key, "strangeSalt").await.unwrap();
        std::mem::swap(&mut record.enc_seed, &mut record.enc_hd_root_priv);
        assert!(kv.deserialize(&record, &key).await.is_err());
    }

    #[test]
    fn derived_key_debug_is_redacted() {
        let key = DerivedKey::from_bytes([42u8; DERIVED_KEY_LEN]);
        assert_eq!(format!("{key:?}"), "DerivedKey(..)");
        let json = serde_json::to_string(&key).unwrap();
        let back: DerivedKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
