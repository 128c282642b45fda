use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::settings::KdfSettings;

pub const DERIVED_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const MIN_SALT_LEN: usize = 8;

const HD_ROOT_SALT: &[u8] = b"walletguard-hd-root-v1";

pub fn derive_key(
    password: &str,
    salt: &[u8],
    kdf: &KdfSettings,
) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>, CryptoError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt must be at least {MIN_SALT_LEN} bytes"
        )));
    }
    let params = Params::new(
        kdf.memory_cost_kib,
        kdf.time_cost,
        kdf.parallelism,
        Some(DERIVED_KEY_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("argon2 params: {e}")))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    argon
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2 derive: {e}")))?;
    Ok(key)
}

pub fn encrypt(
    key: &[u8; DERIVED_KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Encrypt)
}

pub fn decrypt(
    key: &[u8; DERIVED_KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::Decrypt)?;
    Ok(Zeroizing::new(plaintext))
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn generate_seed() -> Zeroizing<[u8; 32]> {
    let mut seed = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut seed[..]);
    seed
}

/// HD root private key for `hd_path`, expanded from the wallet seed.
pub fn derive_hd_root(seed: &[u8], hd_path: &str) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(HD_ROOT_SALT), seed);
    let mut root = Zeroizing::new([0u8; 32]);
    hk.expand(hd_path.as_bytes(), &mut root[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(root)
}

/// Short hex id for a public key, safe to put in logs.
pub fn public_key_fingerprint(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_kdf() -> KdfSettings {
        KdfSettings {
            memory_cost_kib: 256,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn derive_key_is_deterministic() {
        let a = derive_key("password", b"strangeSalt", &cheap_kdf()).unwrap();
        let b = derive_key("password", b"strangeSalt", &cheap_kdf()).unwrap();
        let c = derive_key("password", b"otherSaltValue", &cheap_kdf()).unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn short_salt_is_rejected() {
        let err = derive_key("password", b"short", &cheap_kdf()).unwrap_err();
        assert!(matches!(err, CryptoError::KeyDerivation(_)));
    }

    #[test]
    fn aad_binds_ciphertext_to_its_field() {
        let key = [7u8; DERIVED_KEY_LEN];
        let nonce = generate_nonce();
        let ct = encrypt(&key, &nonce, b"seed bytes", b"seed").unwrap();
        assert_eq!(&*decrypt(&key, &nonce, &ct, b"seed").unwrap(), b"seed bytes");
        assert!(matches!(
            decrypt(&key, &nonce, &ct, b"hd-root"),
            Err(CryptoError::Decrypt)
        ));
        assert!(matches!(
            decrypt(&[8u8; DERIVED_KEY_LEN], &nonce, &ct, b"seed"),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn hd_root_depends_on_path() {
        let seed = [1u8; 32];
        let a = derive_hd_root(&seed, "m/0'/0'/0'").unwrap();
        let b = derive_hd_root(&seed, "m/0'/0'/1'").unwrap();
        assert_ne!(*a, *b);
    }
}
