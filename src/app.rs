use crate::errors::OpsError;
use crate::managers::pool::SessionPool;
use crate::managers::servers::ServerManager;
use crate::managers::transport::{SshTransportFactory, TransportFactory};
use crate::services::audit::AuditService;
use crate::services::credentials::CredentialStore;
use crate::services::logger::Logger;
use crate::services::registry::ServerRegistry;
use crate::services::security::Security;
use crate::services::settings::Settings;
use crate::utils::paths::{
    resolve_audit_path, resolve_credentials_path, resolve_key_path, resolve_servers_path,
};
use std::sync::Arc;
use std::time::Duration;

pub struct App {
    pub logger: Logger,
    pub settings: Settings,
    pub manager: Arc<ServerManager>,
    pub pool: Arc<SessionPool>,
}

impl App {
    // All components are constructed once and wired by explicit references;
    // nothing in the codebase instantiates a sibling manager ad hoc.
    pub fn initialize() -> Result<Self, OpsError> {
        let logger = Logger::new("opsdeck");
        let settings = Settings::load();

        let security = Arc::new(Security::new(&resolve_key_path(&settings.data_dir))?);
        let credentials = Arc::new(CredentialStore::new(
            logger.clone(),
            security,
            resolve_credentials_path(&settings.data_dir),
        )?);
        let registry = Arc::new(ServerRegistry::new(
            logger.clone(),
            credentials,
            resolve_servers_path(&settings.data_dir),
        )?);
        let audit = Arc::new(AuditService::new(
            logger.clone(),
            resolve_audit_path(&settings.data_dir),
        ));

        let factory: Arc<dyn TransportFactory> = Arc::new(SshTransportFactory);
        let pool = Arc::new(SessionPool::new(
            logger.clone(),
            factory.clone(),
            settings.max_sessions,
            Duration::from_secs(settings.idle_timeout_secs),
            Duration::from_secs(settings.sweep_interval_secs),
        ));
        pool.start_reaper();

        let manager = Arc::new(ServerManager::new(
            logger.clone(),
            registry,
            pool.clone(),
            audit,
            factory,
        ));

        Ok(Self {
            logger,
            settings,
            manager,
            pool,
        })
    }
}
