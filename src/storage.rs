use crate::error::AppError;
use crate::types::{StatsResponse, UrlCheck, Verdict};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

/// Local verdict sink. One connection behind a mutex; every write is a
/// single small statement, so contention stays negligible at this
/// service's request rates.
pub struct VerdictStore {
    conn: Mutex<Connection>,
}

impl VerdictStore {
    pub fn open(db_path: &str) -> Result<Self, AppError> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS url_checks (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                prediction TEXT NOT NULL,
                confidence REAL NOT NULL,
                user TEXT NOT NULL,
                checked_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_url_checks_checked_at
             ON url_checks (checked_at DESC)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record(&self, check: &UrlCheck) -> Result<(), AppError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO url_checks (id, url, prediction, confidence, user, checked_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                check.id.to_string(),
                check.url,
                check.prediction.as_str(),
                check.confidence,
                check.user,
                check.checked_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn recent(&self, limit: u32) -> Result<Vec<UrlCheck>, AppError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, url, prediction, confidence, user, checked_at
             FROM url_checks ORDER BY checked_at DESC LIMIT ?",
        )?;

        let rows = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut checks = Vec::with_capacity(rows.len());
        for (id, url, prediction, confidence, user, checked_at) in rows {
            checks.push(UrlCheck {
                id: Uuid::parse_str(&id)
                    .map_err(|e| AppError::Internal(format!("corrupt check id: {e}")))?,
                url,
                prediction: Verdict::parse(&prediction)
                    .ok_or_else(|| AppError::Internal(format!("corrupt verdict: {prediction}")))?,
                confidence,
                user,
                checked_at: parse_timestamp(&checked_at)?,
            });
        }
        Ok(checks)
    }

    pub fn stats(&self) -> Result<StatsResponse, AppError> {
        let conn = self.conn.lock().unwrap();
        let (total, phishing, avg_confidence, last): (u64, u64, Option<f64>, Option<String>) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(prediction = 'phishing'), 0),
                        AVG(confidence),
                        MAX(checked_at)
                 FROM url_checks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let last_checked = match last {
            Some(ts) => Some(parse_timestamp(&ts)?),
            None => None,
        };

        Ok(StatsResponse {
            total_checks: total,
            phishing,
            legitimate: total - phishing,
            average_confidence: avg_confidence.unwrap_or(0.0),
            last_checked,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("corrupt timestamp '{raw}': {e}")))
}
