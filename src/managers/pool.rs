use crate::constants::pool::EVICTION_RETRY_LIMIT;
use crate::errors::OpsError;
use crate::managers::session::RemoteSession;
use crate::managers::transport::{ConnectTarget, TransportFactory};
use crate::services::logger::Logger;
use crate::services::registry::ServerProfile;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct Acquired {
    pub session: Arc<RemoteSession>,
    pub created: bool,
}

impl std::fmt::Debug for Acquired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquired")
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

// Bounded map of live sessions keyed by profile id. The map mutex guards
// membership only and is never held across the handshake; per-profile-id
// locks linearize concurrent acquires for the same server so exactly one of
// them dials.
pub struct SessionPool {
    logger: Logger,
    factory: Arc<dyn TransportFactory>,
    max_sessions: usize,
    idle_timeout: Duration,
    sweep_interval: Duration,
    sessions: Mutex<HashMap<i64, Arc<RemoteSession>>>,
    connect_locks: DashMap<i64, Arc<tokio::sync::Mutex<()>>>,
    reaper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionPool {
    pub fn new(
        logger: Logger,
        factory: Arc<dyn TransportFactory>,
        max_sessions: usize,
        idle_timeout: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            logger: logger.child("pool"),
            factory,
            max_sessions: max_sessions.max(1),
            idle_timeout,
            sweep_interval,
            sessions: Mutex::new(HashMap::new()),
            connect_locks: DashMap::new(),
            reaper: Mutex::new(None),
        }
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Arc<RemoteSession>>> {
        self.sessions.lock().unwrap_or_else(|err| err.into_inner())
    }

    // Live entry for the id, dropping a stale disconnected one on the way.
    fn lookup_live(&self, profile_id: i64) -> Option<Arc<RemoteSession>> {
        let mut sessions = self.lock_sessions();
        match sessions.get(&profile_id) {
            Some(session) if session.is_connected() => Some(session.clone()),
            Some(_) => {
                sessions.remove(&profile_id);
                None
            }
            None => None,
        }
    }

    fn pop_lru(sessions: &mut HashMap<i64, Arc<RemoteSession>>) -> Option<Arc<RemoteSession>> {
        let victim_id = sessions
            .iter()
            .min_by_key(|(_, session)| session.activity_seq())
            .map(|(id, _)| *id)?;
        sessions.remove(&victim_id)
    }

    async fn close_session(&self, session: Arc<RemoteSession>) {
        let _ = tokio::task::spawn_blocking(move || session.close()).await;
    }

    async fn make_room(&self) -> Result<(), OpsError> {
        for _ in 0..EVICTION_RETRY_LIMIT {
            let victim = {
                let mut sessions = self.lock_sessions();
                if sessions.len() < self.max_sessions {
                    return Ok(());
                }
                Self::pop_lru(&mut sessions)
            };
            match victim {
                Some(session) => {
                    self.logger.debug(
                        "Evicting least recently used session",
                        Some(&serde_json::json!({"profile_id": session.profile_id()})),
                    );
                    self.close_session(session).await;
                }
                None => return Ok(()),
            }
        }
        Err(OpsError::capacity("Session pool is full"))
    }

    // Insert the freshly connected session, evicting again if a competitor
    // filled the pool while this caller was dialing.
    async fn commit(&self, session: Arc<RemoteSession>) -> Result<(), OpsError> {
        for _ in 0..EVICTION_RETRY_LIMIT {
            let victim = {
                let mut sessions = self.lock_sessions();
                if sessions.len() < self.max_sessions {
                    sessions.insert(session.profile_id(), session.clone());
                    return Ok(());
                }
                Self::pop_lru(&mut sessions)
            };
            match victim {
                Some(victim) => self.close_session(victim).await,
                None => break,
            }
        }
        self.close_session(session).await;
        Err(OpsError::capacity("Session pool is full"))
    }

    pub async fn acquire(&self, profile: &ServerProfile) -> Result<Acquired, OpsError> {
        if let Some(session) = self.lookup_live(profile.id) {
            return Ok(Acquired {
                session,
                created: false,
            });
        }

        let connect_lock = self
            .connect_locks
            .entry(profile.id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = connect_lock.lock().await;

        // A concurrent acquirer may have finished connecting while this one
        // waited on the per-id lock.
        if let Some(session) = self.lookup_live(profile.id) {
            return Ok(Acquired {
                session,
                created: false,
            });
        }

        let target = ConnectTarget::from_profile(profile)?;
        self.make_room().await?;

        let factory = self.factory.clone();
        let profile_id = profile.id;
        let session = tokio::task::spawn_blocking(move || {
            RemoteSession::establish(factory.as_ref(), &target, profile_id)
        })
        .await
        .map_err(|_| OpsError::protocol("Session connect task failed"))??;
        let session = Arc::new(session);

        self.commit(session.clone()).await?;
        self.logger.info(
            "Session established",
            Some(&serde_json::json!({"profile_id": profile.id, "host": profile.host})),
        );
        Ok(Acquired {
            session,
            created: true,
        })
    }

    pub async fn release(&self, profile_id: i64) -> bool {
        let removed = {
            let mut sessions = self.lock_sessions();
            sessions.remove(&profile_id)
        };
        match removed {
            Some(session) => {
                self.close_session(session).await;
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&self) {
        let drained: Vec<Arc<RemoteSession>> = {
            let mut sessions = self.lock_sessions();
            sessions.drain().map(|(_, session)| session).collect()
        };
        for session in drained {
            self.close_session(session).await;
        }
    }

    // One reaper pass. Idleness is re-read under the map lock immediately
    // before removal so a session that became active a moment earlier
    // survives the sweep.
    pub async fn sweep_idle(&self) -> usize {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let idle_ms = self.idle_timeout.as_millis() as i64;
        let expired: Vec<Arc<RemoteSession>> = {
            let mut sessions = self.lock_sessions();
            let expired_ids: Vec<i64> = sessions
                .iter()
                .filter(|(_, session)| {
                    !session.is_connected() || now_ms - session.last_activity_ms() > idle_ms
                })
                .map(|(id, _)| *id)
                .collect();
            expired_ids
                .into_iter()
                .filter_map(|id| sessions.remove(&id))
                .collect()
        };
        let reaped = expired.len();
        for session in expired {
            self.logger.debug(
                "Reaping idle session",
                Some(&serde_json::json!({"profile_id": session.profile_id()})),
            );
            self.close_session(session).await;
        }
        reaped
    }

    pub fn start_reaper(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let interval = self.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                let reaped = pool.sweep_idle().await;
                if reaped > 0 {
                    pool.logger.info(
                        "Reaper pass complete",
                        Some(&serde_json::json!({"reaped": reaped})),
                    );
                }
            }
        });
        *self.reaper.lock().unwrap_or_else(|err| err.into_inner()) = Some(handle);
    }

    pub async fn shutdown(&self) {
        let handle = self
            .reaper
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.close_all().await;
    }

    pub fn live_count(&self) -> usize {
        self.lock_sessions().len()
    }
}
