//! Per-operator JSONL logs
//!
//! `<log_dir>/operators/<operator>.jsonl`, one record per applied operator.
//! Files are only ever appended.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use morphos_common::{OperatorKind, PlatformState, StoreError};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

/// One applied operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorRecord {
    pub cycle_id: String,
    pub timestamp: DateTime<Utc>,
    pub operator: OperatorKind,
    pub entropy: f64,
    pub ordinal: Option<u64>,
    /// Operator-owned state field
    pub field: String,
    pub before: f64,
    pub after: f64,
    /// Store version the transition was committed as
    pub state_version: u64,
}

impl OperatorRecord {
    /// Summarize the transition `before -> after` made by `operator`
    pub fn summarize(
        cycle_id: &str,
        operator: OperatorKind,
        entropy: f64,
        ordinal: Option<u64>,
        before: &PlatformState,
        after: &PlatformState,
    ) -> Self {
        Self {
            cycle_id: cycle_id.to_string(),
            timestamp: Utc::now(),
            operator,
            entropy,
            ordinal,
            field: owned_field(operator).to_string(),
            before: field_value(operator, before),
            after: field_value(operator, after),
            state_version: after.version,
        }
    }
}

/// Name of the state field an operator transforms
pub fn owned_field(kind: OperatorKind) -> &'static str {
    match kind {
        OperatorKind::Linear => "linear_progress",
        OperatorKind::Circular => "circular_phase",
        OperatorKind::Rotating => "rotation_angle",
        OperatorKind::Modular => "modules_active",
        OperatorKind::Iterative => "iteration_count",
        OperatorKind::Inverted => "validation_score",
    }
}

fn field_value(kind: OperatorKind, state: &PlatformState) -> f64 {
    match kind {
        OperatorKind::Linear => state.linear_progress,
        OperatorKind::Circular => state.circular_phase,
        OperatorKind::Rotating => state.rotation_angle,
        OperatorKind::Modular => state.module_count() as f64,
        OperatorKind::Iterative => state.iteration_count as f64,
        OperatorKind::Inverted => state.validation_score,
    }
}

/// Append-only operator logs rooted at a directory
#[derive(Debug, Clone)]
pub struct OperatorLog {
    dir: PathBuf,
}

impl OperatorLog {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: log_dir.as_ref().join("operators"),
        }
    }

    pub fn path_for(&self, kind: OperatorKind) -> PathBuf {
        self.dir.join(format!("{}.jsonl", kind.as_str()))
    }

    pub async fn append(&self, record: &OperatorRecord) -> Result<(), StoreError> {
        let mut line =
            serde_json::to_vec(record).map_err(|e| StoreError::Encoding(e.to_string()))?;
        line.push(b'\n');

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(record.operator))
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(&line)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.flush().await.map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Every record logged for `kind`; a missing file reads as empty
    pub async fn read(&self, kind: OperatorKind) -> Result<Vec<OperatorRecord>, StoreError> {
        let raw = match tokio::fs::read_to_string(self.path_for(kind)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(|e| StoreError::Encoding(e.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_is_per_operator() {
        let dir = tempfile::tempdir().unwrap();
        let log = OperatorLog::new(dir.path());

        let before = PlatformState {
            linear_progress: 2.0,
            ..Default::default()
        };
        let after = PlatformState {
            linear_progress: 2.3,
            version: 4,
            ..Default::default()
        };
        let record =
            OperatorRecord::summarize("c1", OperatorKind::Linear, 0.3, None, &before, &after);
        log.append(&record).await.unwrap();
        log.append(&record).await.unwrap();

        let lines = log.read(OperatorKind::Linear).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].field, "linear_progress");
        assert_eq!(lines[0].before, 2.0);
        assert_eq!(lines[0].after, 2.3);
        assert_eq!(lines[0].state_version, 4);

        assert!(log.read(OperatorKind::Circular).await.unwrap().is_empty());
        assert!(log.path_for(OperatorKind::Linear).ends_with("operators/linear.jsonl"));
    }
}
