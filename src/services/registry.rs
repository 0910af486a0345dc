use crate::constants::network::{DEFAULT_OPERATION_TIMEOUT_SECS, SSH_DEFAULT_PORT};
use crate::errors::OpsError;
use crate::services::credentials::{Credential, CredentialStore};
use crate::services::logger::Logger;
use crate::utils::fs_atomic::atomic_write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub timeout_secs: u64,
    pub description: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Full in-memory view: a persisted row plus its decrypted credential. Never
// written to disk in this shape.
#[derive(Debug, Clone)]
pub struct ServerProfile {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub key_file_path: Option<String>,
    pub timeout_secs: u64,
    pub description: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServerProfile {
    fn merge(record: ServerRecord, credential: Credential) -> Self {
        Self {
            id: record.id,
            name: record.name,
            host: record.host,
            port: record.port,
            username: record.username,
            password: credential.password,
            key_file_path: credential.key_file_path,
            timeout_secs: record.timeout_secs,
            description: record.description,
            active: record.active,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerInput {
    pub name: String,
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub key_file_path: Option<String>,
    pub timeout_secs: Option<u64>,
    pub description: String,
    pub active: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDoc {
    next_id: i64,
    servers: Vec<ServerRecord>,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: i64,
    rows: BTreeMap<i64, ServerRecord>,
}

#[derive(Clone)]
pub struct ServerRegistry {
    logger: Logger,
    credentials: Arc<CredentialStore>,
    file_path: PathBuf,
    state: Arc<RwLock<RegistryState>>,
}

impl ServerRegistry {
    pub fn new(
        logger: Logger,
        credentials: Arc<CredentialStore>,
        file_path: PathBuf,
    ) -> Result<Self, OpsError> {
        let registry = Self {
            logger: logger.child("registry"),
            credentials,
            file_path,
            state: Arc::new(RwLock::new(RegistryState {
                next_id: 1,
                rows: BTreeMap::new(),
            })),
        };
        registry.load_state()?;
        Ok(registry)
    }

    fn load_state(&self) -> Result<(), OpsError> {
        if !self.file_path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(&self.file_path)
            .map_err(|err| OpsError::persistence(format!("Failed to load servers: {}", err)))?;
        let doc: RegistryDoc = serde_json::from_str(&raw)
            .map_err(|err| OpsError::persistence(format!("Failed to parse servers: {}", err)))?;
        let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
        state.rows = doc.servers.into_iter().map(|row| (row.id, row)).collect();
        state.next_id = state
            .rows
            .keys()
            .next_back()
            .map(|max| max + 1)
            .unwrap_or(1)
            .max(doc.next_id);
        Ok(())
    }

    fn persist(&self, state: &RegistryState) -> Result<(), OpsError> {
        let doc = RegistryDoc {
            next_id: state.next_id,
            servers: state.rows.values().cloned().collect(),
        };
        let data = serde_json::to_string_pretty(&doc)
            .map_err(|err| OpsError::persistence(format!("Failed to serialize servers: {}", err)))?;
        atomic_write(&self.file_path, &format!("{}\n", data), 0o600)
            .map_err(|err| OpsError::persistence(format!("Failed to save servers: {}", err)))
    }

    fn validate(input: &ServerInput) -> Result<(), OpsError> {
        if input.name.trim().is_empty() {
            return Err(OpsError::invalid_params("Server name must not be empty"));
        }
        if input.host.trim().is_empty() {
            return Err(OpsError::invalid_params("Server host must not be empty"));
        }
        if input.username.trim().is_empty() {
            return Err(OpsError::invalid_params("Server username must not be empty"));
        }
        Ok(())
    }

    fn build_record(id: i64, input: &ServerInput, created_at: DateTime<Utc>) -> ServerRecord {
        ServerRecord {
            id,
            name: input.name.trim().to_string(),
            host: input.host.trim().to_string(),
            port: input.port.unwrap_or(SSH_DEFAULT_PORT),
            username: input.username.trim().to_string(),
            timeout_secs: input.timeout_secs.unwrap_or(DEFAULT_OPERATION_TIMEOUT_SECS),
            description: input.description.clone(),
            active: input.active,
            created_at,
            updated_at: Utc::now(),
        }
    }

    // The row lands before the credential. If the credential write fails the
    // row is rolled back so no profile ever exists without its secret row.
    pub fn add(&self, input: ServerInput) -> Result<ServerProfile, OpsError> {
        Self::validate(&input)?;
        let record = {
            let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
            let id = state.next_id;
            let record = Self::build_record(id, &input, Utc::now());
            state.rows.insert(id, record.clone());
            state.next_id = id + 1;
            if let Err(err) = self.persist(&state) {
                state.rows.remove(&id);
                state.next_id = id;
                return Err(err);
            }
            record
        };

        if let Err(err) = self
            .credentials
            .save(record.id, &input.password, input.key_file_path.as_deref())
        {
            let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
            state.rows.remove(&record.id);
            let _ = self.persist(&state);
            self.logger.warn(
                "Credential save failed, rolled back profile",
                Some(&serde_json::json!({"id": record.id, "error": err.message})),
            );
            return Err(OpsError::persistence(format!(
                "Failed to store credential for '{}': {}",
                record.name, err.message
            )));
        }

        self.logger.info(
            "Server added",
            Some(&serde_json::json!({"id": record.id, "name": record.name})),
        );
        Ok(ServerProfile::merge(
            record,
            Credential {
                password: input.password,
                key_file_path: input.key_file_path,
            },
        ))
    }

    pub fn update(&self, id: i64, input: ServerInput) -> Result<ServerProfile, OpsError> {
        Self::validate(&input)?;
        let (record, previous) = {
            let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
            let previous = state
                .rows
                .get(&id)
                .cloned()
                .ok_or_else(|| OpsError::not_found(format!("Server {} not found", id)))?;
            let record = Self::build_record(id, &input, previous.created_at);
            state.rows.insert(id, record.clone());
            if let Err(err) = self.persist(&state) {
                state.rows.insert(id, previous);
                return Err(err);
            }
            (record, previous)
        };

        if let Err(err) = self
            .credentials
            .save(id, &input.password, input.key_file_path.as_deref())
        {
            let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
            state.rows.insert(id, previous);
            let _ = self.persist(&state);
            return Err(OpsError::persistence(format!(
                "Failed to store credential for '{}': {}",
                record.name, err.message
            )));
        }

        Ok(ServerProfile::merge(
            record,
            Credential {
                password: input.password,
                key_file_path: input.key_file_path,
            },
        ))
    }

    pub fn remove(&self, id: i64) -> Result<(), OpsError> {
        {
            let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
            let removed = state
                .rows
                .remove(&id)
                .ok_or_else(|| OpsError::not_found(format!("Server {} not found", id)))?;
            if let Err(err) = self.persist(&state) {
                state.rows.insert(id, removed);
                return Err(err);
            }
        }
        self.credentials.remove(id)?;
        self.logger.info("Server removed", Some(&serde_json::json!({"id": id})));
        Ok(())
    }

    pub fn get(&self, id: i64) -> Result<ServerProfile, OpsError> {
        let record = {
            let state = self.state.read().unwrap_or_else(|err| err.into_inner());
            state
                .rows
                .get(&id)
                .cloned()
                .ok_or_else(|| OpsError::not_found(format!("Server {} not found", id)))?
        };
        let credential = self.credentials.load(id);
        Ok(ServerProfile::merge(record, credential))
    }

    pub fn list(&self) -> Vec<ServerProfile> {
        let records: Vec<ServerRecord> = {
            let state = self.state.read().unwrap_or_else(|err| err.into_inner());
            state.rows.values().cloned().collect()
        };
        let mut profiles: Vec<ServerProfile> = records
            .into_iter()
            .map(|record| {
                let credential = self.credentials.load(record.id);
                ServerProfile::merge(record, credential)
            })
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        profiles
    }

    pub fn counts(&self) -> (usize, usize) {
        let state = self.state.read().unwrap_or_else(|err| err.into_inner());
        let total = state.rows.len();
        let active = state.rows.values().filter(|row| row.active).count();
        (total, active)
    }
}
