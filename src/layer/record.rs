//! Build record persisted under a locally staged image root

use crate::error::{BerthError, BerthResult};
use crate::layer::digest::LayerDigest;
use crate::layer::snapshot::{Snapshot, StageKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Record location relative to the image root
pub const RECORD_PATH: &str = ".berth/build.json";

/// Outcome of the most recent staging run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Snapshot after the last stage that completed
    pub snapshot: Snapshot,

    /// Stage that aborted the build, if any
    pub failed_stage: Option<StageKind>,

    /// Error message of the failed stage
    pub error: Option<String>,

    /// When the record was written
    pub updated_at: DateTime<Utc>,
}

impl BuildRecord {
    /// Record for a build that reached `snapshot`
    pub fn completed(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            failed_stage: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Record for a build that failed in `stage` on top of `snapshot`
    pub fn failed(snapshot: Snapshot, stage: StageKind, error: impl Into<String>) -> Self {
        Self {
            snapshot,
            failed_stage: Some(stage),
            error: Some(error.into()),
            updated_at: Utc::now(),
        }
    }

    /// Record file path for an image root
    pub fn file_path(root: &Path) -> PathBuf {
        root.join(RECORD_PATH)
    }

    /// Cache key of the layer `stage` produced, if it completed
    pub fn layer_key(&self, stage: StageKind) -> Option<&LayerDigest> {
        self.snapshot.layer(stage).map(|l| &l.key)
    }

    /// Load the record of an image root; `None` if there is none
    pub async fn load(root: &Path) -> BerthResult<Option<Self>> {
        let path = Self::file_path(root);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| BerthError::io(format!("reading build record {}", path.display()), e))?;

        let record: BuildRecord = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    /// Write the record under `root`
    pub async fn save(&self, root: &Path) -> BerthResult<()> {
        let path = Self::file_path(root);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BerthError::io("creating build record directory", e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .await
            .map_err(|e| BerthError::io(format!("writing build record {}", path.display()), e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::snapshot::BuildState;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_record_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(BuildRecord::load(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_record_survives_reload() {
        let dir = TempDir::new().unwrap();
        let record = BuildRecord::failed(
            Snapshot::base("python:3.11-slim"),
            StageKind::Resolve,
            "no matching distribution",
        );
        record.save(dir.path()).await.unwrap();

        let loaded = BuildRecord::load(dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded.failed_stage, Some(StageKind::Resolve));
        assert_eq!(loaded.snapshot.state(), BuildState::Pending);
        assert!(loaded.layer_key(StageKind::Resolve).is_none());

        let raw = std::fs::read_to_string(dir.path().join(RECORD_PATH)).unwrap();
        assert!(raw.contains("\"state\": \"pending\""));
        assert!(raw.contains("\"failed_stage\": \"resolve\""));
    }
}
