//! Envelope encryption of agent private keys at rest.
//!
//! Ciphertext layout: nonce(12) || AES-256-GCM ciphertext || tag(16).
//! A fresh random nonce is drawn for every encryption.

use crate::{constants::*, errors::*, keys::AgentKeyPair};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::Zeroizing;

/// AES-256-GCM vault holding the loaded master key
///
/// The vault has no interior mutability, so one instance can be shared across
/// tasks. Master-key rotation produces new ciphertexts and never mutates the
/// input.
pub struct KeyVault {
    master_key: Zeroizing<[u8; MASTER_KEY_SIZE]>,
    version: u32,
}

impl fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVault")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Vault-side record of an agent private key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrivateKeyRecord {
    /// Owning agent
    pub agent_id: Uuid,
    /// nonce || ciphertext of the 64-byte private key
    pub encrypted_key: Vec<u8>,
    /// Master key version the record is sealed under
    pub key_version: u32,
    /// When the key pair was sealed
    pub created_at: u64,
}

impl KeyVault {
    /// Create a vault at master key version 1
    ///
    /// Fails with `InvalidMasterKey` unless the key is exactly 32 bytes.
    pub fn new(master_key: &[u8]) -> Result<Self> {
        Self::with_version(master_key, 1)
    }

    /// Create a vault for a specific master key version
    pub fn with_version(master_key: &[u8], version: u32) -> Result<Self> {
        let key: [u8; MASTER_KEY_SIZE] =
            master_key
                .try_into()
                .map_err(|_| CryptoError::InvalidMasterKey {
                    expected: MASTER_KEY_SIZE,
                    actual: master_key.len(),
                })?;

        Ok(Self {
            master_key: Zeroizing::new(key),
            version,
        })
    }

    /// Master key version
    pub fn version(&self) -> u32 {
        self.version
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.master_key.as_ref()))
    }

    /// Encrypt plaintext under the master key
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with_aad(plaintext, &[])
    }

    /// Decrypt `nonce || ciphertext` produced by [`KeyVault::encrypt`]
    ///
    /// Returns `DecryptionFailed` on truncated input or tag mismatch. No
    /// plaintext is released on failure.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.decrypt_with_aad(ciphertext, &[])
    }

    /// Encrypt with associated data bound into the tag
    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| CryptoError::RandomGenerationFailed(e.to_string()))?;

        let sealed = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Decrypt with associated data
    pub fn decrypt_with_aad(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed(format!(
                "ciphertext truncated: {} bytes",
                ciphertext.len()
            )));
        }

        let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
        self.cipher()
            .decrypt(
                Nonce::from_slice(nonce),
                Payload { msg: sealed, aad },
            )
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::DecryptionFailed("authentication tag mismatch".to_string()))
    }

    /// Re-encrypt a ciphertext under a new master key
    ///
    /// Either a complete new ciphertext is returned or an error, in which case
    /// the borrowed original remains valid under the current key.
    pub fn rotate_master_key(&self, ciphertext: &[u8], new_master_key: &[u8]) -> Result<Vec<u8>> {
        let next = KeyVault::with_version(new_master_key, self.version + 1)?;
        let plaintext = self.decrypt(ciphertext)?;
        next.encrypt(&plaintext)
    }

    /// Seal an agent private key into a vault record
    pub fn seal_private_key(
        &self,
        agent_id: Uuid,
        keypair: &AgentKeyPair,
        created_at: u64,
    ) -> Result<PrivateKeyRecord> {
        let secret = keypair.to_keypair_bytes();
        let encrypted_key = self.encrypt_with_aad(secret.as_ref(), &private_key_aad(&agent_id))?;

        Ok(PrivateKeyRecord {
            agent_id,
            encrypted_key,
            key_version: self.version,
            created_at,
        })
    }

    /// Open a vault record into the agent key pair
    ///
    /// The plaintext exists only in memory for the lifetime of the returned key
    /// pair. A record that decrypts to an inconsistent key pair is reported as
    /// `KeyPairMismatch`.
    pub fn open_private_key(&self, record: &PrivateKeyRecord) -> Result<AgentKeyPair> {
        if record.key_version != self.version {
            return Err(CryptoError::KeyVersionMismatch {
                vault: self.version,
                record: record.key_version,
            });
        }

        let secret =
            self.decrypt_with_aad(&record.encrypted_key, &private_key_aad(&record.agent_id))?;
        AgentKeyPair::from_keypair_bytes(&secret)
    }

    /// Re-seal a record under another vault
    ///
    /// The record is opened and validated first, so corrupted material is
    /// never carried over to the new master key.
    pub fn rotate_record(
        &self,
        record: &PrivateKeyRecord,
        next: &KeyVault,
    ) -> Result<PrivateKeyRecord> {
        let keypair = self.open_private_key(record)?;
        next.seal_private_key(record.agent_id, &keypair, record.created_at)
    }
}

fn private_key_aad(agent_id: &Uuid) -> Vec<u8> {
    let mut aad = Vec::with_capacity(DOMAIN_PRIVATE_KEY_AAD.len() + 16);
    aad.extend_from_slice(DOMAIN_PRIVATE_KEY_AAD.as_bytes());
    aad.extend_from_slice(agent_id.as_bytes());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault(byte: u8) -> KeyVault {
        KeyVault::new(&[byte; MASTER_KEY_SIZE]).unwrap()
    }

    #[test]
    fn test_new_rejects_wrong_master_key_size() {
        for len in [0usize, 16, 31, 33, 64] {
            let err = KeyVault::new(&vec![1u8; len]).unwrap_err();
            assert!(matches!(
                err,
                CryptoError::InvalidMasterKey { expected: 32, actual } if actual == len
            ));
        }
    }

    #[test]
    fn test_encrypt_decrypt() {
        let vault = vault(1);
        let ciphertext = vault.encrypt(b"agent secret").unwrap();

        assert_eq!(ciphertext.len(), NONCE_SIZE + 12 + TAG_SIZE);
        assert_eq!(vault.decrypt(&ciphertext).unwrap().as_slice(), b"agent secret");
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let vault = vault(1);
        let a = vault.encrypt(b"same").unwrap();
        let b = vault.encrypt(b"same").unwrap();

        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let ciphertext = vault(1).encrypt(b"agent secret").unwrap();
        assert!(matches!(
            vault(2).decrypt(&ciphertext),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_decrypt_truncated() {
        let vault = vault(1);
        let ciphertext = vault.encrypt(b"agent secret").unwrap();

        for len in [0, 5, NONCE_SIZE, NONCE_SIZE + TAG_SIZE - 1, ciphertext.len() - 1] {
            assert!(matches!(
                vault.decrypt(&ciphertext[..len]),
                Err(CryptoError::DecryptionFailed(_))
            ));
        }
    }

    #[test]
    fn test_decrypt_tampered() {
        let vault = vault(1);
        let mut ciphertext = vault.encrypt(b"agent secret").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;

        assert!(matches!(
            vault.decrypt(&ciphertext),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_rotate_master_key() {
        let old = vault(1);
        let ciphertext = old.encrypt(b"agent secret").unwrap();

        let rotated = old.rotate_master_key(&ciphertext, &[2u8; 32]).unwrap();

        assert_eq!(vault(2).decrypt(&rotated).unwrap(), old.decrypt(&ciphertext).unwrap());
        assert!(old.decrypt(&rotated).is_err());
    }

    #[test]
    fn test_rotate_failure_leaves_original_intact() {
        let old = vault(1);
        let ciphertext = old.encrypt(b"agent secret").unwrap();
        let snapshot = ciphertext.clone();

        assert!(old.rotate_master_key(&ciphertext, &[2u8; 8]).is_err());
        assert!(vault(3).rotate_master_key(&ciphertext, &[2u8; 32]).is_err());

        assert_eq!(ciphertext, snapshot);
        assert_eq!(old.decrypt(&ciphertext).unwrap().as_slice(), b"agent secret");
    }

    #[test]
    fn test_seal_and_open_private_key() {
        let vault = vault(1);
        let agent_id = Uuid::new_v4();
        let keypair = AgentKeyPair::generate().unwrap();

        let record = vault.seal_private_key(agent_id, &keypair, 100).unwrap();
        assert_eq!(record.key_version, 1);
        assert_eq!(vault.open_private_key(&record).unwrap(), keypair);
    }

    #[test]
    fn test_record_is_bound_to_agent() {
        let vault = vault(1);
        let keypair = AgentKeyPair::generate().unwrap();
        let mut record = vault.seal_private_key(Uuid::new_v4(), &keypair, 100).unwrap();

        record.agent_id = Uuid::new_v4();
        assert!(matches!(
            vault.open_private_key(&record),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_rotate_record() {
        let old = vault(1);
        let next = KeyVault::with_version(&[2u8; 32], 2).unwrap();
        let keypair = AgentKeyPair::generate().unwrap();
        let record = old.seal_private_key(Uuid::new_v4(), &keypair, 100).unwrap();

        let rotated = old.rotate_record(&record, &next).unwrap();

        assert_eq!(rotated.key_version, 2);
        assert_eq!(rotated.created_at, 100);
        assert_eq!(next.open_private_key(&rotated).unwrap(), keypair);
        assert!(matches!(
            old.open_private_key(&rotated),
            Err(CryptoError::KeyVersionMismatch { vault: 1, record: 2 })
        ));
    }

    #[test]
    fn test_rotate_record_refuses_corrupted_material() {
        let old = vault(1);
        let next = KeyVault::with_version(&[2u8; 32], 2).unwrap();
        let agent_id = Uuid::new_v4();

        // Well-formed ciphertext over bytes that are not a valid key pair
        let garbage = old
            .encrypt_with_aad(&[0xAB; PRIVATE_KEY_SIZE], &private_key_aad(&agent_id))
            .unwrap();
        let record = PrivateKeyRecord {
            agent_id,
            encrypted_key: garbage,
            key_version: 1,
            created_at: 0,
        };

        assert!(matches!(
            old.rotate_record(&record, &next),
            Err(CryptoError::KeyPairMismatch(_))
        ));
    }
}
