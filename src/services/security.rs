use crate::constants::buffers::{CRYPTO_IV_SIZE, CRYPTO_KEY_SIZE, CRYPTO_TAG_SIZE};
use crate::errors::OpsError;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::Engine;
use rand::RngCore;
use std::fs;
use std::io::Write;
use std::path::Path;

fn decode_key(raw: &str) -> Option<Vec<u8>> {
    let trimmed = raw.trim();
    if trimmed.len() == CRYPTO_KEY_SIZE * 2 {
        return hex::decode(trimmed).ok().filter(|k| k.len() == CRYPTO_KEY_SIZE);
    }
    if trimmed.len() == CRYPTO_KEY_SIZE {
        return Some(trimmed.as_bytes().to_vec());
    }
    if trimmed.len() > CRYPTO_KEY_SIZE * 2 {
        let engine = base64::engine::general_purpose::STANDARD;
        return engine
            .decode(trimmed.as_bytes())
            .ok()
            .filter(|k| k.len() == CRYPTO_KEY_SIZE);
    }
    None
}

#[derive(Clone)]
pub struct Security {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Security").finish_non_exhaustive()
    }
}

impl Security {
    pub fn new(key_path: &Path) -> Result<Self, OpsError> {
        let secret_key = Self::load_or_create_secret(key_path)?;
        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(&secret_key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    fn load_or_create_secret(path: &Path) -> Result<Vec<u8>, OpsError> {
        if let Ok(raw) = std::env::var("OPSDECK_ENCRYPTION_KEY") {
            if let Some(decoded) = decode_key(&raw) {
                return Ok(decoded);
            }
        }

        if path.exists() {
            let stored = fs::read_to_string(path).map_err(|err| {
                OpsError::key_init(format!("Failed to read key file {}: {}", path.display(), err))
            })?;
            return decode_key(&stored).ok_or_else(|| {
                OpsError::key_init(format!("Key file {} is not a valid key", path.display()))
            });
        }

        let mut generated = vec![0u8; CRYPTO_KEY_SIZE];
        OsRng.fill_bytes(&mut generated);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                OpsError::key_init(format!(
                    "Failed to create key directory {}: {}",
                    parent.display(),
                    err
                ))
            })?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|err| {
                OpsError::key_init(format!(
                    "Failed to create key file {}: {}",
                    path.display(),
                    err
                ))
            })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|err| {
                    OpsError::key_init(format!("Failed to restrict key file permissions: {}", err))
                })?;
        }
        file.write_all(hex::encode(&generated).as_bytes())
            .map_err(|err| OpsError::key_init(format!("Failed to write key file: {}", err)))?;
        Ok(generated)
    }

    // Payload format: "<iv_hex>:<tag_hex>:<data_hex>". An absent secret stays
    // absent: the empty string maps to the empty string in both directions.
    pub fn encrypt(&self, text: &str) -> Result<String, OpsError> {
        if text.is_empty() {
            return Ok(String::new());
        }
        let mut iv = [0u8; CRYPTO_IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        let nonce = aes_gcm::Nonce::from_slice(&iv);
        let mut ciphertext = self
            .cipher
            .encrypt(nonce, text.as_bytes())
            .map_err(|_| OpsError::decryption("Failed to encrypt secret payload"))?;
        if ciphertext.len() < CRYPTO_TAG_SIZE {
            return Err(OpsError::decryption("Failed to encrypt secret payload"));
        }
        let tag = ciphertext.split_off(ciphertext.len() - CRYPTO_TAG_SIZE);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, payload: &str) -> Result<String, OpsError> {
        if payload.is_empty() {
            return Ok(String::new());
        }
        let parts: Vec<&str> = payload.split(':').collect();
        if parts.len() != 3 {
            return Err(OpsError::decryption("Invalid encrypted payload format"));
        }
        let iv = hex::decode(parts[0])
            .map_err(|_| OpsError::decryption("Invalid encrypted payload format"))?;
        let tag = hex::decode(parts[1])
            .map_err(|_| OpsError::decryption("Invalid encrypted payload format"))?;
        let data = hex::decode(parts[2])
            .map_err(|_| OpsError::decryption("Invalid encrypted payload format"))?;
        if iv.len() != CRYPTO_IV_SIZE || tag.len() != CRYPTO_TAG_SIZE {
            return Err(OpsError::decryption("Invalid encrypted payload format"));
        }
        let mut combined = Vec::with_capacity(data.len() + tag.len());
        combined.extend_from_slice(&data);
        combined.extend_from_slice(&tag);
        let nonce = aes_gcm::Nonce::from_slice(&iv);
        let decrypted = self
            .cipher
            .decrypt(nonce, combined.as_ref())
            .map_err(|_| OpsError::decryption("Failed to decrypt secret payload"))?;
        Ok(String::from_utf8_lossy(&decrypted).to_string())
    }
}
