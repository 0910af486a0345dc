use crate::errors::OpsError;
use crate::managers::transport::{ConnectTarget, ExecOutput, Transport, TransportFactory};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// Process-wide tick used to order sessions for eviction. Wall-clock
// milliseconds can collide when two sessions are touched back to back; this
// counter cannot.
static ACTIVITY_CLOCK: AtomicU64 = AtomicU64::new(1);

fn next_activity_tick() -> u64 {
    ACTIVITY_CLOCK.fetch_add(1, Ordering::SeqCst)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct RemoteSession {
    profile_id: i64,
    transport: Mutex<Option<Box<dyn Transport>>>,
    connected: AtomicBool,
    established_at_ms: i64,
    last_activity_ms: AtomicI64,
    activity_seq: AtomicU64,
}

impl RemoteSession {
    pub fn establish(
        factory: &dyn TransportFactory,
        target: &ConnectTarget,
        profile_id: i64,
    ) -> Result<Self, OpsError> {
        let transport = factory.connect(target)?;
        let now = now_ms();
        Ok(Self {
            profile_id,
            transport: Mutex::new(Some(transport)),
            connected: AtomicBool::new(true),
            established_at_ms: now,
            last_activity_ms: AtomicI64::new(now),
            activity_seq: AtomicU64::new(next_activity_tick()),
        })
    }

    // Connect, run a no-op, tear down. Used for connectivity checks that must
    // not occupy a pool slot.
    pub fn test_round_trip(
        factory: &dyn TransportFactory,
        target: &ConnectTarget,
        profile_id: i64,
    ) -> Result<(), OpsError> {
        let session = Self::establish(factory, target, profile_id)?;
        let result = session.run("echo ok", target.timeout);
        session.close();
        result.map(|_| ())
    }

    fn touch(&self) {
        self.last_activity_ms.store(now_ms(), Ordering::SeqCst);
        self.activity_seq.store(next_activity_tick(), Ordering::SeqCst);
    }

    // The transport mutex doubles as the per-session command lock: two
    // concurrent run calls on one session execute one after the other.
    pub fn run(&self, command: &str, timeout: Duration) -> Result<ExecOutput, OpsError> {
        let mut guard = self.transport.lock().unwrap_or_else(|err| err.into_inner());
        if !self.connected.load(Ordering::SeqCst) {
            return Err(OpsError::not_connected(format!(
                "Session for server {} is not connected",
                self.profile_id
            )));
        }
        let Some(transport) = guard.as_mut() else {
            return Err(OpsError::not_connected(format!(
                "Session for server {} is not connected",
                self.profile_id
            )));
        };
        match transport.exec(command, timeout) {
            Ok(output) => {
                self.touch();
                Ok(output)
            }
            Err(err) => {
                // Channel state is suspect after a failed or timed-out exec.
                if let Some(mut dead) = guard.take() {
                    dead.close();
                }
                self.connected.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    pub fn close(&self) {
        let mut guard = self.transport.lock().unwrap_or_else(|err| err.into_inner());
        if let Some(mut transport) = guard.take() {
            transport.close();
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn profile_id(&self) -> i64 {
        self.profile_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn established_at_ms(&self) -> i64 {
        self.established_at_ms
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms.load(Ordering::SeqCst)
    }

    pub fn activity_seq(&self) -> u64 {
        self.activity_seq.load(Ordering::SeqCst)
    }
}
