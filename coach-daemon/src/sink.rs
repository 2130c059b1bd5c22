//! Optional append-only session sink: records coaching output to SQLite.
//!
//! A missing or failing sink must not affect engine output (§4.H) — every
//! public method here swallows its own errors into a `tracing::warn!`,
//! logged at most once per interval, and returns without propagating.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use coach_core::payload::CoachingPayload;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Append-only sink for per-frame coaching output, called at most every
/// Nth processed frame.
pub struct SessionSink {
    pool: DbPool,
    interval: u32,
    counter: AtomicU64,
    last_warn_logged: AtomicU64,
}

impl SessionSink {
    pub fn open(db_path: &Path, interval: u32) -> crate::error::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder().max_size(4).build(manager)?;
        let conn = pool.get()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            CREATE TABLE IF NOT EXISTS session_frames (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts_ms INTEGER NOT NULL,
                exercise TEXT NOT NULL,
                rep INTEGER NOT NULL,
                quality_score REAL NOT NULL,
                rms_divergence REAL NOT NULL,
                correction_count INTEGER NOT NULL,
                payload_json TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            pool,
            interval: interval.max(1),
            counter: AtomicU64::new(0),
            last_warn_logged: AtomicU64::new(0),
        })
    }

    /// Records one coaching payload if this frame lands on the configured
    /// interval. Never returns an error to the caller.
    pub fn record(&self, payload: &CoachingPayload) {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.interval as u64 != 0 {
            return;
        }
        if let Err(e) = self.try_record(payload) {
            let now = payload.ts_ms;
            let last = self.last_warn_logged.swap(now, Ordering::Relaxed);
            if now.saturating_sub(last) > 10_000 {
                tracing::warn!(error = %e, "session sink write failed");
            }
        }
    }

    fn try_record(&self, payload: &CoachingPayload) -> crate::error::Result<()> {
        let conn = self.pool.get()?;
        let payload_json = serde_json::to_string(payload)?;
        conn.execute(
            "INSERT INTO session_frames (ts_ms, exercise, rep, quality_score, rms_divergence, correction_count, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                payload.ts_ms as i64,
                payload.exercise.name,
                payload.exercise.rep,
                payload.quality.score,
                payload.quality.rms_divergence,
                payload.corrections.len() as i64,
                payload_json,
            ],
        )
        .map_err(|e| crate::error::DaemonError::InvalidConfig(format!("sink insert: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_core::payload::*;
    use tempfile::tempdir;

    fn sample_payload() -> CoachingPayload {
        CoachingPayload {
            ts_ms: 1000,
            exercise: ExerciseInfo {
                name: "squat".into(),
                phase: Phase::Setup,
                rep: 0,
                reference_frame: 0,
            },
            quality: QualityInfo {
                score: 0.9,
                confidence: 0.9,
                distance: 0.1,
                rms_divergence: 0.02,
            },
            measurements: Measurements {
                left_knee_angle_deg: 170.0,
                right_knee_angle_deg: 170.0,
                avg_knee_angle_deg: 170.0,
                left_foot_x_body: 0.5,
                right_foot_x_body: -0.5,
            },
            corrections: vec![],
            procrustes: None,
            divergences: vec![],
            coaching: vec![],
            ref_skeleton_img: None,
            should_speak: false,
        }
    }

    #[test]
    fn records_every_nth_frame() {
        let dir = tempdir().unwrap();
        let sink = SessionSink::open(&dir.path().join("session.db"), 2).unwrap();
        for _ in 0..4 {
            sink.record(&sample_payload());
        }
        let conn = sink.pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM session_frames", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
