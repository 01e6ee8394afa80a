//! # Checkpointing
//!
//! Periodic persistence of the population store so that a run can be resumed
//! with warm start. A snapshot is one JSON document containing every score
//! record plus the submission counter; it is written to a temporary file and
//! atomically renamed so a crash mid-write never corrupts the previous
//! snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{EvolveError, Result};
use crate::population::ScoreRecord;

/// File name of the snapshot inside the checkpoint folder.
const SNAPSHOT_FILE: &str = "population.json";

/// A serialized view of the run state sufficient for warm start.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckpointSnapshot<I> {
    /// Every score record, in completion order.
    pub records: Vec<ScoreRecord<I>>,
    /// Total individuals submitted (drives the budget schedule on resume).
    pub submitted: u64,
}

fn snapshot_path(folder: &Path) -> PathBuf {
    folder.join(SNAPSHOT_FILE)
}

/// Writes a snapshot into `folder`, creating the folder if needed.
///
/// # Errors
///
/// Returns `EvolveError::Io` on filesystem failures and
/// `EvolveError::Checkpoint` when the snapshot cannot be encoded.
pub fn save<I: Serialize>(folder: &Path, snapshot: &CheckpointSnapshot<I>) -> Result<()> {
    fs::create_dir_all(folder)?;

    let encoded = serde_json::to_vec(snapshot)
        .map_err(|e| EvolveError::Checkpoint(format!("failed to encode snapshot: {}", e)))?;

    let path = snapshot_path(folder);
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, encoded)?;
    fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Reads the snapshot from `folder`, or `None` when no snapshot exists yet.
///
/// # Errors
///
/// Returns `EvolveError::Checkpoint` when a snapshot exists but cannot be
/// read or decoded; a warm start must not silently continue from nothing
/// when the caller pointed it at corrupt state.
pub fn load<I: DeserializeOwned>(folder: &Path) -> Result<Option<CheckpointSnapshot<I>>> {
    let path = snapshot_path(folder);
    if !path.exists() {
        return Ok(None);
    }

    let bytes = fs::read(&path)
        .map_err(|e| EvolveError::Checkpoint(format!("failed to read snapshot: {}", e)))?;
    let snapshot = serde_json::from_slice(&bytes)
        .map_err(|e| EvolveError::Checkpoint(format!("failed to decode snapshot: {}", e)))?;
    Ok(Some(snapshot))
}
