use rusqlite::{params, Connection, Result as SqlResult};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use label_scan_common::frame::CaptureTrigger;
use label_scan_common::verdict::ComplianceVerdict;

/// Status stored for submissions that never produced a verdict.
const FAILED_STATUS: &str = "FAILED";

/// Per-device SQLite log of every capture submitted for analysis.
///
/// One file per device: `{db_dir}/{device_id}.db`. Verdicts and failures
/// land in the same `scans` table so the history reads in capture order.
pub struct ScanLog {
    conn: Mutex<Connection>,
    device_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScanRecord {
    pub id: i64,
    pub captured_at_ms: i64,
    pub capture_trigger: String,
    pub status: String,
    pub confidence: Option<f64>,
    pub processing_time_ms: Option<f64>,
    pub missing_fields: Vec<String>,
    pub pii_detected: Vec<String>,
    pub error: Option<String>,
}

/// Totals per outcome, newest device history included.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ScanStats {
    pub total: u64,
    pub compliant: u64,
    pub non_compliant: u64,
    pub manual_review: u64,
    pub failed: u64,
}

impl ScanLog {
    /// Open (or create) the log for a device. Creates `db_dir` if needed.
    pub fn open(db_dir: &Path, device_id: &str) -> SqlResult<Self> {
        std::fs::create_dir_all(db_dir)
            .map_err(|_e| rusqlite::Error::InvalidPath(db_dir.into()))?;

        let db_path = db_dir.join(format!("{device_id}.db"));
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let log = Self::init(conn, device_id)?;

        info!(path = db_path.display().to_string(), device_id, "scan log opened");
        Ok(log)
    }

    pub fn open_in_memory(device_id: &str) -> SqlResult<Self> {
        Self::init(Connection::open_in_memory()?, device_id)
    }

    fn init(conn: Connection, device_id: &str) -> SqlResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scans (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id          TEXT    NOT NULL,
                captured_at_ms     INTEGER NOT NULL,
                capture_trigger    TEXT    NOT NULL CHECK(capture_trigger IN ('auto','manual')),
                status             TEXT    NOT NULL,
                confidence         REAL,
                processing_time_ms REAL,
                missing_fields     TEXT    DEFAULT '[]',
                pii_detected       TEXT    DEFAULT '[]',
                error              TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_scans_time
                ON scans(device_id, captured_at_ms);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            device_id: device_id.to_string(),
        })
    }

    /// Record a verdict. Returns the new row id.
    pub fn insert_verdict(
        &self,
        captured_at_ms: i64,
        trigger: CaptureTrigger,
        verdict: &ComplianceVerdict,
    ) -> SqlResult<i64> {
        let missing = serde_json::to_string(&verdict.missing_fields()).unwrap_or_else(|_| "[]".into());
        let pii = serde_json::to_string(verdict.pii_categories()).unwrap_or_else(|_| "[]".into());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO scans (device_id, captured_at_ms, capture_trigger, status, confidence,
                                processing_time_ms, missing_fields, pii_detected)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                self.device_id,
                captured_at_ms,
                trigger.as_str(),
                verdict.compliance_status.as_str(),
                verdict.confidence_score,
                verdict.processing_time_ms,
                missing,
                pii,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, captured_at_ms, status = verdict.compliance_status.as_str(), "logged verdict");
        Ok(id)
    }

    /// Record a submission that failed before a verdict came back.
    pub fn insert_failure(
        &self,
        captured_at_ms: i64,
        trigger: CaptureTrigger,
        error: &str,
    ) -> SqlResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO scans (device_id, captured_at_ms, capture_trigger, status, error)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![self.device_id, captured_at_ms, trigger.as_str(), FAILED_STATUS, error],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, captured_at_ms, error, "logged failed submission");
        Ok(id)
    }

    /// Most recent scans first.
    pub fn recent(&self, limit: u32) -> SqlResult<Vec<ScanRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, captured_at_ms, capture_trigger, status, confidence, processing_time_ms,
                    missing_fields, pii_detected, error
             FROM scans WHERE device_id = ?1
             ORDER BY captured_at_ms DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![self.device_id, limit], |row| {
            let missing_raw: String = row.get(6)?;
            let pii_raw: String = row.get(7)?;
            Ok(ScanRecord {
                id: row.get(0)?,
                captured_at_ms: row.get(1)?,
                capture_trigger: row.get(2)?,
                status: row.get(3)?,
                confidence: row.get(4)?,
                processing_time_ms: row.get(5)?,
                missing_fields: serde_json::from_str(&missing_raw).unwrap_or_default(),
                pii_detected: serde_json::from_str(&pii_raw).unwrap_or_default(),
                error: row.get(8)?,
            })
        })?;
        rows.collect()
    }

    pub fn stats(&self) -> SqlResult<ScanStats> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM scans WHERE device_id = ?1 GROUP BY status")?;
        let mut stats = ScanStats::default();
        let rows = stmt.query_map(params![self.device_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            let count = count as u64;
            stats.total += count;
            match status.as_str() {
                "COMPLIANT" => stats.compliant += count,
                "NON_COMPLIANT" => stats.non_compliant += count,
                "MANUAL_REVIEW" => stats.manual_review += count,
                FAILED_STATUS => stats.failed += count,
                _ => {}
            }
        }
        Ok(stats)
    }
}
