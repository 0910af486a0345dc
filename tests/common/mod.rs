#![allow(dead_code)]

use chrono::Utc;
use once_cell::sync::Lazy;
use opsdeck::errors::OpsError;
use opsdeck::managers::pool::SessionPool;
use opsdeck::managers::servers::ServerManager;
use opsdeck::managers::transport::{ConnectTarget, ExecOutput, Transport, TransportFactory};
use opsdeck::services::audit::AuditService;
use opsdeck::services::credentials::CredentialStore;
use opsdeck::services::logger::Logger;
use opsdeck::services::registry::{ServerInput, ServerProfile, ServerRegistry};
use opsdeck::services::security::Security;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

pub static ENV_LOCK: Lazy<AsyncMutex<()>> = Lazy::new(|| AsyncMutex::new(()));

pub fn tmp_dir(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
}

#[derive(Clone)]
pub struct ScriptedBehavior {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub connect_delay: Duration,
}

impl Default for ScriptedBehavior {
    fn default() -> Self {
        Self {
            exit_code: 0,
            stdout: "ok\n".to_string(),
            stderr: String::new(),
            connect_delay: Duration::ZERO,
        }
    }
}

// In-memory stand-in for the SSH transport so pool and manager semantics can
// be exercised without a network.
pub struct ScriptedFactory {
    behavior: Mutex<ScriptedBehavior>,
    fail_connect: AtomicBool,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(ScriptedBehavior::default()),
            fail_connect: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn set_behavior(&self, behavior: ScriptedBehavior) {
        *self.behavior.lock().expect("behavior lock") = behavior;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl TransportFactory for ScriptedFactory {
    fn connect(&self, _target: &ConnectTarget) -> Result<Box<dyn Transport>, OpsError> {
        let behavior = self.behavior.lock().expect("behavior lock").clone();
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !behavior.connect_delay.is_zero() {
            std::thread::sleep(behavior.connect_delay);
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(OpsError::protocol("scripted connect failure"));
        }
        Ok(Box::new(ScriptedTransport {
            behavior,
            closes: self.closes.clone(),
            closed: false,
        }))
    }
}

pub struct ScriptedTransport {
    behavior: ScriptedBehavior,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl Transport for ScriptedTransport {
    fn exec(&mut self, _command: &str, _timeout: Duration) -> Result<ExecOutput, OpsError> {
        Ok(ExecOutput {
            exit_code: self.behavior.exit_code,
            stdout: self.behavior.stdout.clone(),
            stderr: self.behavior.stderr.clone(),
            duration_ms: 0,
        })
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct Harness {
    pub dir: PathBuf,
    pub factory: Arc<ScriptedFactory>,
    pub credentials: Arc<CredentialStore>,
    pub registry: Arc<ServerRegistry>,
    pub audit: Arc<AuditService>,
    pub pool: Arc<SessionPool>,
    pub manager: Arc<ServerManager>,
}

pub fn build_harness(dir: &Path, max_sessions: usize, idle_timeout: Duration) -> Harness {
    std::fs::create_dir_all(dir).expect("create data dir");
    let logger = Logger::new("test");
    let security = Arc::new(Security::new(&dir.join(".opsdeck.key")).expect("security"));
    let credentials = Arc::new(
        CredentialStore::new(logger.clone(), security, dir.join("credentials.json"))
            .expect("credential store"),
    );
    let registry = Arc::new(
        ServerRegistry::new(logger.clone(), credentials.clone(), dir.join("servers.json"))
            .expect("registry"),
    );
    let audit = Arc::new(AuditService::new(logger.clone(), dir.join("audit.jsonl")));
    let factory = ScriptedFactory::new();
    let factory_dyn: Arc<dyn TransportFactory> = factory.clone();
    let pool = Arc::new(SessionPool::new(
        logger.clone(),
        factory_dyn.clone(),
        max_sessions,
        idle_timeout,
        Duration::from_secs(60),
    ));
    let manager = Arc::new(ServerManager::new(
        logger,
        registry.clone(),
        pool.clone(),
        audit.clone(),
        factory_dyn,
    ));
    Harness {
        dir: dir.to_path_buf(),
        factory,
        credentials,
        registry,
        audit,
        pool,
        manager,
    }
}

pub fn sample_input(name: &str, password: &str) -> ServerInput {
    ServerInput {
        name: name.to_string(),
        host: "10.0.0.5".to_string(),
        port: Some(22),
        username: "ops".to_string(),
        password: password.to_string(),
        key_file_path: None,
        timeout_secs: Some(5),
        description: String::new(),
        active: true,
    }
}

pub fn sample_profile(id: i64, name: &str, password: &str) -> ServerProfile {
    let now = Utc::now();
    ServerProfile {
        id,
        name: name.to_string(),
        host: "10.0.0.5".to_string(),
        port: 22,
        username: "ops".to_string(),
        password: password.to_string(),
        key_file_path: None,
        timeout_secs: 5,
        description: String::new(),
        active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn build_pool(
    factory: &Arc<ScriptedFactory>,
    max_sessions: usize,
    idle_timeout: Duration,
    sweep_interval: Duration,
) -> Arc<SessionPool> {
    let factory_dyn: Arc<dyn TransportFactory> = factory.clone();
    Arc::new(SessionPool::new(
        Logger::new("test"),
        factory_dyn,
        max_sessions,
        idle_timeout,
        sweep_interval,
    ))
}
