use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use platdir_core::{slugify, PlatformRecord};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::{sha256_hex, write_atomic};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{}: expected a JSON array or an object with a `platforms` array", path.display())]
    Shape { path: PathBuf },
    #[error("{}: record {index} is not a JSON object", path.display())]
    NotAnObject { path: PathBuf, index: usize },
    #[error("{}: record {index}: {source}", path.display())]
    Record {
        path: PathBuf,
        index: usize,
        source: serde_json::Error,
    },
}

/// How the record array sits in the file, so saves keep the same shape.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreLayout {
    Array,
    /// `{ "platforms": [...], ...other keys }`
    Wrapped { rest: JsonMap<String, JsonValue> },
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub path: PathBuf,
    pub backup_path: PathBuf,
    pub sha256: String,
    pub record_count: usize,
    pub saved_at: DateTime<Utc>,
}

/// Single owner of a `platforms.json` file for one command.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    layout: StoreLayout,
}

impl RecordStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<(Self, Vec<PlatformRecord>), StoreError> {
        let path = path.into();
        let bytes = fs::read(&path).await.map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        let value: JsonValue = serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
            path: path.clone(),
            source,
        })?;

        let (layout, items) = match value {
            JsonValue::Array(items) => (StoreLayout::Array, items),
            JsonValue::Object(mut map) => match map.remove("platforms") {
                Some(JsonValue::Array(items)) => (StoreLayout::Wrapped { rest: map }, items),
                _ => return Err(StoreError::Shape { path }),
            },
            _ => return Err(StoreError::Shape { path }),
        };

        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            if !item.is_object() {
                return Err(StoreError::NotAnObject { path, index });
            }
            let record = serde_json::from_value(item).map_err(|source| StoreError::Record {
                path: path.clone(),
                index,
                source,
            })?;
            records.push(record);
        }

        info!(path = %path.display(), records = records.len(), ?layout, "loaded platforms");
        Ok((Self { path, layout }, records))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// `platforms.json` + `dedup` -> `platforms.before-dedup.json`, beside the primary file.
    pub fn backup_path(&self, label: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "platforms".to_string());
        let label = slugify(label);
        self.path.with_file_name(format!("{stem}.before-{label}.json"))
    }

    pub fn render(&self, records: &[PlatformRecord]) -> anyhow::Result<Vec<u8>> {
        let mut bytes = match &self.layout {
            StoreLayout::Array => serde_json::to_vec_pretty(records),
            StoreLayout::Wrapped { rest } => {
                let mut map = rest.clone();
                map.insert(
                    "platforms".to_string(),
                    serde_json::to_value(records).context("serializing platforms")?,
                );
                serde_json::to_vec_pretty(&map)
            }
        }
        .context("serializing platforms")?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Snapshots the current on-disk file as a backup, then atomically writes `records`.
    pub async fn save(&self, records: &[PlatformRecord], backup_label: &str) -> anyhow::Result<SaveReport> {
        let backup_path = self.backup_path(backup_label);
        let current = fs::read(&self.path)
            .await
            .with_context(|| format!("reading {} for backup", self.path.display()))?;
        write_atomic(&backup_path, &current)
            .await
            .with_context(|| format!("writing backup {}", backup_path.display()))?;

        let bytes = self.render(records)?;
        write_atomic(&self.path, &bytes).await?;

        let report = SaveReport {
            path: self.path.clone(),
            backup_path,
            sha256: sha256_hex(&bytes),
            record_count: records.len(),
            saved_at: Utc::now(),
        };
        info!(
            path = %report.path.display(),
            backup = %report.backup_path.display(),
            records = report.record_count,
            sha256 = %report.sha256,
            "saved platforms"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn write(path: &Path, value: JsonValue) {
        std::fs::write(path, serde_json::to_vec(&value).expect("encode")).expect("write");
    }

    #[tokio::test]
    async fn array_layout_round_trips_with_backup() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("platforms.json");
        let original = json!([
            {"id": "claude", "name": "Claude", "use_cases": ["chat"]},
            {"id": "gamma", "name": "Gamma"}
        ]);
        write(&path, original.clone()).await;

        let (store, mut records) = RecordStore::open(&path).await.expect("open");
        assert_eq!(store.layout(), &StoreLayout::Array);
        records.pop();
        let report = store.save(&records, "dedup").await.expect("save");

        assert_eq!(report.record_count, 1);
        assert_eq!(report.backup_path, dir.path().join("platforms.before-dedup.json"));
        let backup: JsonValue =
            serde_json::from_slice(&std::fs::read(&report.backup_path).expect("backup")).expect("json");
        assert_eq!(backup, original);

        let text = std::fs::read_to_string(&path).expect("saved");
        assert!(text.ends_with("]\n"));
        assert!(text.contains("\n  {\n    \"id\": \"claude\""));
        assert_eq!(report.sha256, sha256_hex(text.as_bytes()));
        let saved: JsonValue = serde_json::from_str(&text).expect("json");
        assert_eq!(saved, json!([{"id": "claude", "name": "Claude", "use_cases": ["chat"]}]));
    }

    #[tokio::test]
    async fn wrapped_layout_is_preserved() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("platforms.json");
        write(&path, json!({"version": 3, "platforms": [{"id": "a", "name": "A"}]})).await;

        let (store, records) = RecordStore::open(&path).await.expect("open");
        assert!(matches!(store.layout(), StoreLayout::Wrapped { .. }));
        store.save(&records, "Id Dedup").await.expect("save");

        let saved: JsonValue =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(saved, json!({"version": 3, "platforms": [{"id": "a", "name": "A"}]}));
        assert!(dir.path().join("platforms.before-id-dedup.json").exists());
    }

    #[tokio::test]
    async fn malformed_inputs_are_errors() {
        let dir = tempdir().expect("tempdir");

        let missing = RecordStore::open(dir.path().join("nope.json")).await;
        assert!(matches!(missing, Err(StoreError::Read { .. })));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "{not json").expect("write");
        assert!(matches!(RecordStore::open(&garbage).await, Err(StoreError::Parse { .. })));

        let scalar = dir.path().join("scalar.json");
        write(&scalar, json!({"items": []})).await;
        assert!(matches!(RecordStore::open(&scalar).await, Err(StoreError::Shape { .. })));

        let mixed = dir.path().join("mixed.json");
        write(&mixed, json!([{"id": "a"}, 7])).await;
        assert!(matches!(
            RecordStore::open(&mixed).await,
            Err(StoreError::NotAnObject { index: 1, .. })
        ));
    }
}
