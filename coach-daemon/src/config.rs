//! Daemon configuration: wraps an `EngineConfig` plus daemon-only fields.

use std::path::PathBuf;

use coach_core::EngineConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop newly arrived frames while one is being processed (default).
    DropOnBusy,
    /// Queue at most one additional frame while one is being processed.
    QueueDepthOne,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::DropOnBusy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub engine: EngineConfig,

    /// Upstream pose source to connect to as a WebSocket client.
    pub ingest_url: String,
    /// HTTP port for `/subscribe`, `/health`, `/status`, `/shutdown`.
    pub http_port: u16,
    /// Directory containing `<exercise>_reference_model.{model.msgpack,meta.json}`.
    pub models_dir: PathBuf,
    /// Exercise the engine is coaching for this run.
    pub exercise: String,
    /// Optional SQLite session sink path; omitted disables the sink.
    pub session_db_path: Option<PathBuf>,
    /// Record at most every Nth processed frame to the session sink.
    pub session_sink_interval: u32,

    pub overflow_policy: OverflowPolicy,
    pub health_report_interval_sec: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            ingest_url: "ws://127.0.0.1:8765/stream".to_string(),
            http_port: 8900,
            models_dir: PathBuf::from("models"),
            exercise: "squat".to_string(),
            session_db_path: None,
            session_sink_interval: 1,
            overflow_policy: OverflowPolicy::default(),
            health_report_interval_sec: 30,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
