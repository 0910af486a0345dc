use crate::errors::OpsError;
use crate::services::logger::Logger;
use crate::services::security::Security;
use crate::utils::fs_atomic::atomic_write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredential {
    password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_file_path: Option<String>,
    modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct Credential {
    pub password: String,
    pub key_file_path: Option<String>,
}

// Sole owner of secret material at rest. Rows are keyed by profile id and the
// password field holds the encrypted payload; the file is rewritten whole on
// every mutation so a crash never leaves a half-written map behind.
#[derive(Clone)]
pub struct CredentialStore {
    logger: Logger,
    security: Arc<Security>,
    file_path: PathBuf,
    rows: Arc<Mutex<HashMap<i64, StoredCredential>>>,
}

impl CredentialStore {
    pub fn new(logger: Logger, security: Arc<Security>, file_path: PathBuf) -> Result<Self, OpsError> {
        let store = Self {
            logger: logger.child("credentials"),
            security,
            file_path,
            rows: Arc::new(Mutex::new(HashMap::new())),
        };
        store.load_rows()?;
        Ok(store)
    }

    fn load_rows(&self) -> Result<(), OpsError> {
        if !self.file_path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(&self.file_path)
            .map_err(|err| OpsError::persistence(format!("Failed to load credentials: {}", err)))?;
        let parsed: HashMap<i64, StoredCredential> = serde_json::from_str(&raw)
            .map_err(|err| OpsError::persistence(format!("Failed to parse credentials: {}", err)))?;
        *self.rows.lock().unwrap_or_else(|err| err.into_inner()) = parsed;
        Ok(())
    }

    fn persist(&self, rows: &HashMap<i64, StoredCredential>) -> Result<(), OpsError> {
        let data = serde_json::to_string_pretty(rows).map_err(|err| {
            OpsError::persistence(format!("Failed to serialize credentials: {}", err))
        })?;
        atomic_write(&self.file_path, &format!("{}\n", data), 0o600)
            .map_err(|err| OpsError::persistence(format!("Failed to save credentials: {}", err)))
    }

    pub fn save(
        &self,
        profile_id: i64,
        password: &str,
        key_file_path: Option<&str>,
    ) -> Result<(), OpsError> {
        let encrypted = self.security.encrypt(password)?;
        let mut rows = self.rows.lock().unwrap_or_else(|err| err.into_inner());
        rows.insert(
            profile_id,
            StoredCredential {
                password: encrypted,
                key_file_path: key_file_path.map(|s| s.to_string()),
                modified_at: Utc::now(),
            },
        );
        self.persist(&rows)
    }

    // Decrypt failure is recoverable here: the caller degrades to "no
    // credential" instead of aborting, so a corrupt row or rotated key must
    // never surface as an error from load.
    pub fn load(&self, profile_id: i64) -> Credential {
        let rows = self.rows.lock().unwrap_or_else(|err| err.into_inner());
        let Some(stored) = rows.get(&profile_id) else {
            return Credential::default();
        };
        let password = match self.security.decrypt(&stored.password) {
            Ok(plain) => plain,
            Err(err) => {
                self.logger.warn(
                    "Credential decrypt failed, degrading to empty secret",
                    Some(&serde_json::json!({"profile_id": profile_id, "error": err.message})),
                );
                String::new()
            }
        };
        Credential {
            password,
            key_file_path: stored.key_file_path.clone(),
        }
    }

    pub fn remove(&self, profile_id: i64) -> Result<(), OpsError> {
        let mut rows = self.rows.lock().unwrap_or_else(|err| err.into_inner());
        if rows.remove(&profile_id).is_none() {
            return Ok(());
        }
        self.persist(&rows)
    }
}
