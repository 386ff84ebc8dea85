//! Credential bundle and pending-key files.
//!
//! Both files hold private key material. They are only ever replaced whole:
//! the new content goes to a sibling temp file with mode 0600, is synced, and
//! is renamed over the target.

use agent_id_crypto::{
    decode_private_key, decode_public_key, encode_private_key, encode_public_key, AgentKeyPair,
    PUBLIC_KEY_SIZE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::errors::{Result, SdkError};

/// Agent credentials as downloaded from the backend
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBundle {
    pub agent_id: Uuid,
    /// Base64, 32 bytes
    pub public_key: String,
    /// Base64, 64 bytes (seed || public key)
    pub private_key: String,
    pub backend_url: String,
    pub status: String,
    pub trust_score: f64,
    pub registered_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rotated_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_count: Option<u32>,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("agent_id", &self.agent_id)
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("backend_url", &self.backend_url)
            .field("status", &self.status)
            .field("rotation_count", &self.rotation_count)
            .finish_non_exhaustive()
    }
}

impl Drop for CredentialBundle {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl CredentialBundle {
    /// Read and check a bundle file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = zeroize::Zeroizing::new(fs::read(path)?);
        let bundle: CredentialBundle = serde_json::from_slice(&bytes)?;
        bundle.keypair()?;
        Ok(bundle)
    }

    /// Replace the bundle file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = zeroize::Zeroizing::new(serde_json::to_vec_pretty(self)?);
        write_atomic(path, &json)
    }

    /// Decode the key pair, checking it matches the recorded public key
    pub fn keypair(&self) -> Result<AgentKeyPair> {
        let keypair = decode_private_key(&self.private_key)?;
        if keypair.public_key_bytes() != self.public_key_bytes()? {
            return Err(SdkError::InvalidBundle(
                "private key does not match public key".to_string(),
            ));
        }
        Ok(keypair)
    }

    pub fn public_key_bytes(&self) -> Result<[u8; PUBLIC_KEY_SIZE]> {
        Ok(decode_public_key(&self.public_key)?)
    }

    /// Switch the bundle to a key the backend has acknowledged
    pub fn apply_rotation(&mut self, keypair: &AgentKeyPair, rotated_at: u64, rotation_count: u32) {
        self.public_key = encode_public_key(&keypair.public_key_bytes());
        self.private_key.zeroize();
        self.private_key = encode_private_key(keypair);
        self.last_rotated_at = Some(rotated_at);
        self.rotation_count = Some(rotation_count);
    }
}

/// Key generated for a rotation whose outcome is not yet known
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingKey {
    pub agent_id: Uuid,
    pub public_key: String,
    pub private_key: String,
    pub created_at: u64,
}

impl fmt::Debug for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingKey")
            .field("agent_id", &self.agent_id)
            .field("public_key", &self.public_key)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl Drop for PendingKey {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl PendingKey {
    pub fn new(agent_id: Uuid, keypair: &AgentKeyPair, created_at: u64) -> Self {
        Self {
            agent_id,
            public_key: encode_public_key(&keypair.public_key_bytes()),
            private_key: encode_private_key(keypair),
            created_at,
        }
    }

    /// Location of the pending key next to its bundle
    pub fn path_for(bundle_path: &Path) -> PathBuf {
        sibling(bundle_path, "pending")
    }

    /// Read the pending key, `None` if there is none
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => {
                let bytes = zeroize::Zeroizing::new(bytes);
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = zeroize::Zeroizing::new(serde_json::to_vec_pretty(self)?);
        write_atomic(path, &json)
    }

    pub fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn keypair(&self) -> Result<AgentKeyPair> {
        let keypair = decode_private_key(&self.private_key)?;
        if encode_public_key(&keypair.public_key_bytes()) != self.public_key {
            return Err(SdkError::InvalidBundle(
                "pending private key does not match its public key".to_string(),
            ));
        }
        Ok(keypair)
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "credentials".into());
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Write-temp-then-rename with owner-only permissions
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = sibling(path, "tmp");
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let result = (|| {
        let mut file = options.open(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(keypair: &AgentKeyPair) -> CredentialBundle {
        CredentialBundle {
            agent_id: Uuid::new_v4(),
            public_key: encode_public_key(&keypair.public_key_bytes()),
            private_key: encode_private_key(keypair),
            backend_url: "https://agents.example.test".to_string(),
            status: "verified".to_string(),
            trust_score: 50.0,
            registered_at: 1_700_000_000,
            last_rotated_at: None,
            rotation_count: None,
        }
    }

    #[test]
    fn test_bundle_json_fields() {
        let keypair = AgentKeyPair::generate().unwrap();
        let mut bundle = bundle(&keypair);

        let value = serde_json::to_value(&bundle).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            [
                "agent_id",
                "backend_url",
                "private_key",
                "public_key",
                "registered_at",
                "status",
                "trust_score"
            ]
        );

        let next = AgentKeyPair::generate().unwrap();
        bundle.apply_rotation(&next, 1_700_000_500, 1);
        let value = serde_json::to_value(&bundle).unwrap();
        assert_eq!(value["last_rotated_at"], 1_700_000_500u64);
        assert_eq!(value["rotation_count"], 1);
        assert_eq!(bundle.keypair().unwrap().public_key_bytes(), next.public_key_bytes());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        let keypair = AgentKeyPair::generate().unwrap();
        let bundle = bundle(&keypair);

        bundle.save(&path).unwrap();
        let loaded = CredentialBundle::load(&path).unwrap();
        assert_eq!(loaded, bundle);
        assert!(!sibling(&path, "tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_mismatched_bundle_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        let mut bad = bundle(&AgentKeyPair::generate().unwrap());
        bad.public_key = encode_public_key(&AgentKeyPair::generate().unwrap().public_key_bytes());
        bad.save(&path).unwrap();

        assert!(matches!(
            CredentialBundle::load(&path),
            Err(SdkError::InvalidBundle(_))
        ));
    }

    #[test]
    fn test_pending_key_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = PendingKey::path_for(&dir.path().join("agent.json"));
        assert!(path.ends_with("agent.json.pending"));
        assert!(PendingKey::load(&path).unwrap().is_none());

        let keypair = AgentKeyPair::generate().unwrap();
        PendingKey::new(Uuid::new_v4(), &keypair, 10).save(&path).unwrap();
        let pending = PendingKey::load(&path).unwrap().unwrap();
        assert_eq!(pending.keypair().unwrap().public_key_bytes(), keypair.public_key_bytes());

        PendingKey::remove(&path).unwrap();
        PendingKey::remove(&path).unwrap();
        assert!(PendingKey::load(&path).unwrap().is_none());
    }
}
