//! Checkpoint save/load
//!
//! Each checkpoint is a directory `checkpoint_epoch_NNNN` holding both
//! networks' weights, a metadata file with the augmentation controller
//! state, and the full metrics history so a resumed run continues the same
//! CSV.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::Gan;
use crate::training::TrainingMetrics;

const CHECKPOINT_PREFIX: &str = "checkpoint_epoch_";

/// Checkpoint metadata, stored as `meta.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Epoch the checkpoint was taken after
    pub epoch: usize,
    /// ADA augmentation probability
    pub ada_prob: f64,
    /// ADA accuracy moving average
    pub ada_acc_ema: f64,
    /// Generator loss at checkpoint
    pub gen_loss: f64,
    /// Discriminator loss at checkpoint
    pub disc_loss: f64,
    /// Timestamp of checkpoint
    pub timestamp: String,
}

impl CheckpointMeta {
    pub fn new(epoch: usize, ada_prob: f64, ada_acc_ema: f64) -> Self {
        Self {
            epoch,
            ada_prob,
            ada_acc_ema,
            gen_loss: 0.0,
            disc_loss: 0.0,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Save a complete checkpoint (weights + metadata + metrics history).
/// Returns the checkpoint directory.
pub fn save_checkpoint(
    gan: &Gan,
    meta: &CheckpointMeta,
    metrics: &TrainingMetrics,
    root: &Path,
) -> anyhow::Result<PathBuf> {
    let dir = root.join(format!("{CHECKPOINT_PREFIX}{:04}", meta.epoch));
    std::fs::create_dir_all(&dir)?;

    gan.save(&dir.join("generator.pt"), &dir.join("discriminator.pt"))?;

    let meta = CheckpointMeta {
        gen_loss: metrics.latest_gen_loss().unwrap_or(0.0),
        disc_loss: metrics.latest_disc_loss().unwrap_or(0.0),
        ..meta.clone()
    };
    let meta_json = serde_json::to_string_pretty(&meta)?;
    std::fs::write(dir.join("meta.json"), meta_json)?;

    metrics.save_csv(&dir.join("metrics.csv"))?;

    Ok(dir)
}

/// Load checkpoint metadata only
pub fn load_checkpoint_meta(dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let content = std::fs::read_to_string(dir.join("meta.json"))?;
    Ok(serde_json::from_str(&content)?)
}

/// Load weights into `gan` and return the saved metadata and metrics.
pub fn load_checkpoint(
    gan: &mut Gan,
    dir: &Path,
) -> anyhow::Result<(CheckpointMeta, TrainingMetrics)> {
    gan.load(&dir.join("generator.pt"), &dir.join("discriminator.pt"))?;

    let meta = load_checkpoint_meta(dir)?;
    let metrics_path = dir.join("metrics.csv");
    let metrics = if metrics_path.exists() {
        TrainingMetrics::load_csv(&metrics_path)?
    } else {
        TrainingMetrics::new()
    };

    Ok((meta, metrics))
}

/// Newest checkpoint directory under `root`, by epoch number in the name
pub fn find_latest_checkpoint(root: &Path) -> anyhow::Result<Option<PathBuf>> {
    if !root.exists() {
        return Ok(None);
    }

    let mut checkpoints: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with(CHECKPOINT_PREFIX))
                .unwrap_or(false)
        })
        .map(|e| e.path())
        .collect();

    checkpoints.sort();
    Ok(checkpoints.pop())
}

/// All checkpoints under `root` with their metadata, oldest first
pub fn list_checkpoints(root: &Path) -> Vec<(PathBuf, CheckpointMeta)> {
    if !root.exists() {
        return vec![];
    }

    let mut found: Vec<_> = std::fs::read_dir(root)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with(CHECKPOINT_PREFIX))
                .unwrap_or(false)
        })
        .filter_map(|e| {
            let path = e.path();
            load_checkpoint_meta(&path).ok().map(|meta| (path, meta))
        })
        .collect();
    found.sort_by(|a, b| a.0.cmp(&b.0));
    found
}
