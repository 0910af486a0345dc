pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;
    pub const KEEPALIVE_INTERVAL_SECS: u32 = 30;
}

pub mod pool {
    pub const DEFAULT_MAX_SESSIONS: usize = 5;
    pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
    pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
    pub const EVICTION_RETRY_LIMIT: usize = 3;
}

pub mod buffers {
    pub const CRYPTO_KEY_SIZE: usize = 32;
    pub const CRYPTO_IV_SIZE: usize = 12;
    pub const CRYPTO_TAG_SIZE: usize = 16;
    pub const MAX_CAPTURE_BYTES: usize = 256 * 1024;
}

pub mod redact {
    pub const MIN_SECRET_LENGTH: usize = 6;
    pub const MASK: &str = "***REDACTED***";
}
