//! Keys for signing and sealing license files.
//!
//! The signing key is an Ed25519 seed. The AES-256-GCM key is derived from a
//! separate master secret with HKDF-SHA256, so the raw secret is never used
//! as a cipher key directly.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

use crate::error::{AppError, Result};

const NONCE_LEN: usize = 12;
const KEY_INFO: &[u8] = b"license-file-encryption-v1";

pub struct LicenseKeys {
    signing_key: SigningKey,
    cipher: Aes256Gcm,
}

fn decode_key(name: &str, hex_value: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_value.trim())
        .map_err(|_| AppError::Internal(format!("{} is not valid hex", name)))?;
    bytes
        .try_into()
        .map_err(|_| AppError::Internal(format!("{} must be 32 bytes (64 hex chars)", name)))
}

impl LicenseKeys {
    pub fn new(signing_seed: [u8; 32], master_secret: [u8; 32]) -> Result<Self> {
        let mut key = [0u8; 32];
        Hkdf::<Sha256>::new(None, &master_secret)
            .expand(KEY_INFO, &mut key)
            .map_err(|e| AppError::Internal(format!("Key derivation failed: {}", e)))?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AppError::Internal(format!("Cipher init failed: {}", e)))?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&signing_seed),
            cipher,
        })
    }

    pub fn from_hex(signing_key: &str, master_key: &str) -> Result<Self> {
        Self::new(
            decode_key("LICENSE_SIGNING_KEY", signing_key)?,
            decode_key("LICENSE_MASTER_KEY", master_key)?,
        )
    }

    /// Fresh random keys. Files sealed with these can't be opened after a restart.
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; 32];
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        OsRng.fill_bytes(&mut secret);
        Self::new(seed, secret)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.verifying_key().verify(message, signature).is_ok()
    }

    /// `nonce || ciphertext`
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| AppError::Internal(format!("Encryption failed: {}", e)))?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(AppError::Validation("Ciphertext too short".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AppError::Validation("License file could not be decrypted".into()))
    }
}
