use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Writes pretty JSON through a sibling temp file so a crash never leaves a torn file.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("serialize json")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

pub fn progress_path(dir: &Path, stage: &str, count: usize) -> PathBuf {
    dir.join(format!("{stage}_progress_{count}.json"))
}

pub fn checkpoint_path(dir: &Path, stage: &str) -> PathBuf {
    dir.join(format!("{stage}_checkpoint.json"))
}

pub fn failed_units_path(dir: &Path, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("failed_urls_{}.json", at.format("%Y%m%d_%H%M%S")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: String,
    /// Keys of units that produced data; never re-run on resume.
    pub processed: BTreeSet<String>,
    pub failed: Vec<String>,
    pub cursor: usize,
    pub total: usize,
    pub snapshot: PathBuf,
    pub written_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = checkpoint_path(dir, &self.stage);
        save_json(&path, self)?;
        Ok(path)
    }

    /// `Ok(None)` when no checkpoint exists for the stage.
    pub fn load(dir: &Path, stage: &str) -> Result<Option<Checkpoint>> {
        let path = checkpoint_path(dir, stage);
        if !path.exists() {
            return Ok(None);
        }
        load_json(&path).map(Some)
    }

    pub fn remaining<'a, U>(&self, units: &'a [(String, U)]) -> Vec<&'a (String, U)> {
        pending(&self.processed, units)
    }
}

/// Units whose key is not in `processed`, in their original order.
pub fn pending<'a, U>(
    processed: &BTreeSet<String>,
    units: &'a [(String, U)],
) -> Vec<&'a (String, U)> {
    units
        .iter()
        .filter(|(key, _)| !processed.contains(key))
        .collect()
}
