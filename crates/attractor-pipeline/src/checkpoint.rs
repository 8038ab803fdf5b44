//! Checkpoint save/restore and crash recovery for pipeline execution.
//!
//! After each node completion the executor can persist a
//! [`attractor_types::Checkpoint`] to disk. On restart, [`load_checkpoint`]
//! discovers the latest snapshot so the pipeline can resume from the last
//! completed node instead of starting over.

use std::path::{Path, PathBuf};

use attractor_types::Checkpoint;

/// Save a checkpoint to `<logs_root>/checkpoint.json`.
///
/// The directory is created if missing. The write is atomic: the checkpoint
/// is serialized to a sibling `.tmp` file which is then renamed over the
/// target, so a crash mid-write never leaves a truncated checkpoint behind.
pub async fn save_checkpoint(
    checkpoint: &Checkpoint,
    logs_root: &Path,
) -> attractor_types::Result<PathBuf> {
    tokio::fs::create_dir_all(logs_root).await?;
    let path = logs_root.join("checkpoint.json");
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(checkpoint)?;
    tokio::fs::write(&tmp_path, json).await?;
    tokio::fs::rename(&tmp_path, &path).await?;
    tracing::debug!(path = %path.display(), "checkpoint saved");
    Ok(path)
}

/// Load the checkpoint from a directory.
///
/// Returns `Ok(None)` when no checkpoint file exists (i.e. first run or after
/// [`clear_checkpoint`]). Checkpoints predating the `node_outcomes` field
/// deserialize it back-filled to empty via `#[serde(default)]` on
/// [`Checkpoint`]; any other shape mismatch is an error.
pub async fn load_checkpoint(logs_root: &Path) -> attractor_types::Result<Option<Checkpoint>> {
    let path = logs_root.join("checkpoint.json");
    if !tokio::fs::try_exists(&path).await? {
        return Ok(None);
    }
    let json = tokio::fs::read_to_string(&path).await?;
    let checkpoint: Checkpoint = serde_json::from_str(&json)?;
    Ok(Some(checkpoint))
}

/// Delete the checkpoint after successful pipeline completion.
pub async fn clear_checkpoint(logs_root: &Path) -> attractor_types::Result<()> {
    let path = logs_root.join("checkpoint.json");
    if tokio::fs::try_exists(&path).await? {
        tokio::fs::remove_file(&path).await?;
    }
    Ok(())
}
