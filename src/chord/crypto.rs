use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::Rng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::StorageError;

const KDF_CONTEXT: &[u8] = b"ringlet-file-seal-v1";
const NONCE_LEN: usize = 12;
const PUBKEY_LEN: usize = 32;

/// Per-node asymmetric key material for end-to-end file payload encryption.
///
/// Payloads are sealed against the storing client's own public key, so only
/// that client can read them back; the nodes holding the payload see
/// ciphertext only.
pub struct NodeKeys {
    secret: StaticSecret,
    public: PublicKey,
}

impl NodeKeys {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        NodeKeys { secret, public }
    }

    pub fn public_key(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Seal a payload: ephemeral X25519 ECDH against our own public key,
    /// SHA-256 key derivation, ChaCha20-Poly1305. Output layout:
    /// `ephemeral_pubkey (32) || nonce (12) || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        let mut ephemeral_bytes = [0u8; 32];
        rand::thread_rng().fill(&mut ephemeral_bytes);
        let ephemeral = StaticSecret::from(ephemeral_bytes);
        let ephemeral_public = PublicKey::from(&ephemeral);

        let shared = ephemeral.diffie_hellman(&self.public);
        let key = derive_key(shared.as_bytes());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce_bytes);
        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| StorageError::Cipher(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| StorageError::Cipher("encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(PUBKEY_LEN + NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(ephemeral_public.as_bytes());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a payload previously produced by `seal`.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, StorageError> {
        if sealed.len() < PUBKEY_LEN + NONCE_LEN {
            return Err(StorageError::Cipher("sealed payload too short".to_string()));
        }
        let mut ephemeral_bytes = [0u8; PUBKEY_LEN];
        ephemeral_bytes.copy_from_slice(&sealed[..PUBKEY_LEN]);
        let ephemeral_public = PublicKey::from(ephemeral_bytes);
        let nonce = &sealed[PUBKEY_LEN..PUBKEY_LEN + NONCE_LEN];
        let ciphertext = &sealed[PUBKEY_LEN + NONCE_LEN..];

        let shared = self.secret.diffie_hellman(&ephemeral_public);
        let key = derive_key(shared.as_bytes());

        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| StorageError::Cipher(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StorageError::Cipher("authentication failed".to_string()))
    }
}

fn derive_key(shared: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(KDF_CONTEXT);
    hasher.update(shared);
    hasher.finalize().into()
}
