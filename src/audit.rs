//! Build and launch event log
//!
//! Writes JSON lines to `~/.local/state/berth/events.log`. Events never
//! abort the workflow: IO failures are logged and dropped.

use crate::config::{schema::Config, ConfigManager};
use crate::layer::{Layer, StageKind};
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// File-based event logger that appends JSON lines
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
}

impl AuditLog {
    /// Create a new event logger from config
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.audit_log,
            path: ConfigManager::audit_log_path(),
        }
    }

    /// Log to an explicit file
    pub fn with_path(path: PathBuf, enabled: bool) -> Self {
        Self { enabled, path }
    }

    /// A build stage produced (or reused) its layer
    pub async fn stage_completed(&self, layer: &Layer) {
        self.log(
            "build.stage.completed",
            &json!({
                "stage": layer.stage,
                "key": layer.key,
                "cached": layer.cached,
                "description": layer.description,
            }),
        )
        .await;
    }

    /// A build stage aborted the build
    pub async fn build_failed(&self, stage: Option<StageKind>, error: &str) {
        self.log("build.failed", &json!({ "stage": stage, "error": error }))
            .await;
    }

    /// An image tag is available
    pub async fn image_built(&self, tag: &str, cached: bool) {
        self.log("image.built", &json!({ "tag": tag, "cached": cached }))
            .await;
    }

    /// The foreground process is about to start
    pub async fn launch_started(&self, command: &[String]) {
        self.log("launch.started", &json!({ "command": command }))
            .await;
    }

    /// Log an event as a JSON line
    pub async fn log(&self, event: &str, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write event log {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerDigest;
    use tempfile::TempDir;

    fn read_events(path: &std::path::Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn stage_event_carries_layer_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");
        let log = AuditLog::with_path(path.clone(), true);

        let layer = Layer {
            stage: StageKind::Resolve,
            input: LayerDigest::of(b"input"),
            key: LayerDigest::of(b"key"),
            description: "install 1 requirement".to_string(),
            cached: true,
        };
        log.stage_completed(&layer).await;

        let events = read_events(&path);
        assert_eq!(events[0]["event"], "build.stage.completed");
        assert_eq!(events[0]["data"]["stage"], "resolve");
        assert_eq!(events[0]["data"]["key"], layer.key.as_str());
        assert_eq!(events[0]["data"]["cached"], true);
        assert!(events[0]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn appends_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/events.log");
        let log = AuditLog::with_path(path.clone(), true);

        log.image_built("berth-app:0123456789ab", false).await;
        log.launch_started(&["streamlit".to_string(), "run".to_string()])
            .await;
        log.build_failed(Some(StageKind::Privilege), "uid taken").await;

        let names: Vec<_> = read_events(&path)
            .iter()
            .map(|e| e["event"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["image.built", "launch.started", "build.failed"]);
    }

    #[tokio::test]
    async fn skips_when_disabled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");
        let log = AuditLog::with_path(path.clone(), false);

        log.image_built("x:y", true).await;

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unwritable_path_is_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("file"), "").unwrap();
        // Parent is a regular file, so the append fails
        let log = AuditLog::with_path(dir.path().join("file/events.log"), true);
        log.image_built("x:y", true).await;
    }
}
