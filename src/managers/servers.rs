use crate::errors::OpsError;
use crate::managers::pool::SessionPool;
use crate::managers::session::RemoteSession;
use crate::managers::transport::{ConnectTarget, TransportFactory};
use crate::services::audit::{AuditOperation, AuditRecord, AuditService, AuditStatus};
use crate::services::logger::Logger;
use crate::services::registry::{ServerInput, ServerProfile, ServerRegistry};
use crate::utils::redact::mask_secrets;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TestReport {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub success: bool,
    pub exit_code: Option<i64>,
    pub stdout: String,
    pub stderr: String,
    pub message: String,
}

impl CommandOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_servers: usize,
    pub active_servers: usize,
    pub total_audit_records: u64,
    pub records_today: u64,
    pub live_sessions: usize,
}

// Top-level façade over the registry, the credential store (behind the
// registry), the session pool, and the audit trail.
pub struct ServerManager {
    logger: Logger,
    registry: Arc<ServerRegistry>,
    pool: Arc<SessionPool>,
    audit: Arc<AuditService>,
    factory: Arc<dyn TransportFactory>,
}

impl ServerManager {
    pub fn new(
        logger: Logger,
        registry: Arc<ServerRegistry>,
        pool: Arc<SessionPool>,
        audit: Arc<AuditService>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            logger: logger.child("servers"),
            registry,
            pool,
            audit,
            factory,
        }
    }

    pub fn add_server(&self, input: ServerInput) -> Result<ServerProfile, OpsError> {
        self.registry.add(input)
    }

    // Any pooled session keeps using the credential it connected with, so a
    // profile update forces a disconnect; the next command dials fresh.
    pub async fn update_server(
        &self,
        id: i64,
        input: ServerInput,
    ) -> Result<ServerProfile, OpsError> {
        let profile = self.registry.update(id, input)?;
        self.pool.release(id).await;
        Ok(profile)
    }

    // Pool eviction happens before the row goes away so no live session ever
    // references a vanished profile.
    pub async fn remove_server(&self, id: i64) -> Result<(), OpsError> {
        self.pool.release(id).await;
        self.registry.remove(id)
    }

    pub fn list_servers(&self) -> Vec<ServerProfile> {
        self.registry.list()
    }

    pub fn get_server(&self, id: i64) -> Result<ServerProfile, OpsError> {
        self.registry.get(id)
    }

    pub async fn test_connection(&self, id: i64) -> Result<TestReport, OpsError> {
        let profile = self.registry.get(id)?;
        let outcome = match ConnectTarget::from_profile(&profile) {
            Ok(target) => {
                let factory = self.factory.clone();
                let profile_id = profile.id;
                tokio::task::spawn_blocking(move || {
                    RemoteSession::test_round_trip(factory.as_ref(), &target, profile_id)
                })
                .await
                .map_err(|_| OpsError::protocol("Connection test task failed"))?
            }
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => {
                self.audit.append(&AuditRecord::new(
                    profile.id,
                    AuditStatus::Success,
                    AuditOperation::Test,
                    None,
                    "connection test succeeded",
                ));
                Ok(TestReport {
                    success: true,
                    message: format!("Connection to '{}' succeeded", profile.name),
                })
            }
            Err(err) => {
                self.audit.append(&AuditRecord::new(
                    profile.id,
                    AuditStatus::Failure,
                    AuditOperation::Test,
                    None,
                    mask_secrets(&err.message, &[profile.password.as_str()]),
                ));
                Ok(TestReport {
                    success: false,
                    message: format!("{}: {}", err.code, err.message),
                })
            }
        }
    }

    pub async fn execute_command(&self, id: i64, command: &str) -> Result<CommandOutcome, OpsError> {
        let profile = self.registry.get(id)?;
        let audited_command = mask_secrets(command, &[profile.password.as_str()]);

        let acquired = match self.pool.acquire(&profile).await {
            Ok(acquired) => acquired,
            Err(err) => {
                self.audit.append(&AuditRecord::new(
                    profile.id,
                    AuditStatus::Failure,
                    AuditOperation::Connect,
                    Some(audited_command),
                    mask_secrets(&err.message, &[profile.password.as_str()]),
                ));
                return Ok(CommandOutcome::failure(format!(
                    "{}: {}",
                    err.code, err.message
                )));
            }
        };
        if acquired.created {
            self.audit.append(&AuditRecord::new(
                profile.id,
                AuditStatus::Success,
                AuditOperation::Connect,
                None,
                format!("connected to {}:{}", profile.host, profile.port),
            ));
        }

        let timeout = Duration::from_secs(profile.timeout_secs);
        let session = acquired.session.clone();
        let command_owned = command.to_string();
        let result =
            tokio::task::spawn_blocking(move || session.run(&command_owned, timeout))
                .await
                .map_err(|_| OpsError::protocol("Command task failed"))?;

        match result {
            Ok(output) => {
                let success = output.exit_code == 0;
                let message = format!("Command exited with status {}", output.exit_code);
                self.audit.append(&AuditRecord::new(
                    profile.id,
                    if success {
                        AuditStatus::Success
                    } else {
                        AuditStatus::Failure
                    },
                    AuditOperation::Exec,
                    Some(audited_command),
                    message.clone(),
                ));
                Ok(CommandOutcome {
                    success,
                    exit_code: Some(output.exit_code),
                    stdout: output.stdout,
                    stderr: output.stderr,
                    message,
                })
            }
            Err(err) => {
                self.logger.warn(
                    "Command execution failed",
                    Some(&serde_json::json!({"profile_id": profile.id, "code": err.code})),
                );
                self.audit.append(&AuditRecord::new(
                    profile.id,
                    AuditStatus::Failure,
                    AuditOperation::Exec,
                    Some(audited_command),
                    mask_secrets(&err.message, &[profile.password.as_str()]),
                ));
                Ok(CommandOutcome::failure(format!(
                    "{}: {}",
                    err.code, err.message
                )))
            }
        }
    }

    pub fn statistics(&self) -> Statistics {
        let (total_servers, active_servers) = self.registry.counts();
        let (total_audit_records, records_today) = self.audit.counts();
        Statistics {
            total_servers,
            active_servers,
            total_audit_records,
            records_today,
            live_sessions: self.pool.live_count(),
        }
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
