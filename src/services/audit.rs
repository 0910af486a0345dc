use crate::services::logger::Logger;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Connect,
    Exec,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub profile_id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: AuditStatus,
    pub operation: AuditOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub result: String,
}

impl AuditRecord {
    pub fn new(
        profile_id: i64,
        status: AuditStatus,
        operation: AuditOperation,
        command: Option<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile_id,
            timestamp: Utc::now(),
            status,
            operation,
            command,
            result: result.into(),
        }
    }
}

// Append-only trail. Rows are never rewritten or deleted here; retention is
// someone else's problem.
#[derive(Clone)]
pub struct AuditService {
    logger: Logger,
    file_path: PathBuf,
    queue: Arc<Mutex<()>>,
}

impl AuditService {
    pub fn new(logger: Logger, file_path: PathBuf) -> Self {
        Self {
            logger: logger.child("audit"),
            file_path,
            queue: Arc::new(Mutex::new(())),
        }
    }

    pub fn append(&self, record: &AuditRecord) {
        let payload = match serde_json::to_string(record) {
            Ok(line) => format!("{}\n", line),
            Err(err) => {
                self.logger.warn(
                    "Audit serialize failed",
                    Some(&serde_json::json!({"error": err.to_string()})),
                );
                return;
            }
        };
        let _guard = self.queue.lock();
        if let Some(parent) = self.file_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(err) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .and_then(|mut file| {
                use std::io::Write;
                file.write_all(payload.as_bytes())
            })
        {
            self.logger.warn(
                "Audit write failed",
                Some(&serde_json::json!({"error": err.to_string()})),
            );
        }
    }

    pub fn counts(&self) -> (u64, u64) {
        let _guard = self.queue.lock();
        let mut total = 0u64;
        let mut today = 0u64;
        let now = Utc::now();
        if let Ok(file) = std::fs::File::open(&self.file_path) {
            let reader = BufReader::new(file);
            for line in reader.lines() {
                let line = line.unwrap_or_default();
                if line.trim().is_empty() {
                    continue;
                }
                let Ok(record) = serde_json::from_str::<AuditRecord>(&line) else {
                    self.logger.warn("Skipping invalid audit entry", None);
                    continue;
                };
                total += 1;
                if record.timestamp.num_days_from_ce() == now.num_days_from_ce() {
                    today += 1;
                }
            }
        }
        (total, today)
    }
}
