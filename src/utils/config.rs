//! Configuration management
//!
//! Nested configuration for the whole training pipeline, loadable from TOML
//! or JSON. Everything that can be wrong about a config is rejected by
//! `validate()` before training starts; nothing is re-checked mid-training.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result as TrainResult, TrainError};
use crate::model::{Activation, DiscriminatorConfig, GeneratorConfig, Norm};
use crate::training::{LossKind, PenaltyKind};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// RNG seed for tensor operations
    pub seed: i64,
    /// Device: "cpu" or "cuda"
    pub device: String,
    /// Data configuration
    pub data: DataConfig,
    /// Model configuration
    pub model: ModelConfig,
    /// Loss and regularizer configuration
    pub loss: LossConfig,
    /// Adaptive discriminator augmentation configuration
    pub ada: AdaConfig,
    /// Optimizer configuration
    pub optimizer: OptimizerConfig,
    /// Training loop configuration
    pub training: TrainingConfig,
}

/// Data-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory of training images
    pub root_dir: String,
    /// Side length images are resized to
    pub image_size: i64,
    /// Batch size
    pub batch_size: usize,
}

/// Model-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Latent dimension size
    pub latent_dim: i64,
    /// Image channels (3 for RGB)
    pub channels: i64,
    /// Base filters for generator
    pub gen_base_filters: i64,
    /// Base filters for discriminator
    pub disc_base_filters: i64,
    /// Discriminator depth (stride-2 stages)
    pub disc_depth: i64,
    /// Dropout rate for discriminator
    pub dropout: f64,
    /// Activation function name
    pub activation: String,
    /// Normalization name for generator blocks
    pub norm: String,
}

/// Loss and gradient-penalty configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossConfig {
    /// Loss variant name: "bce", "wgan_gp" or "ragan"
    pub criterion: String,
    /// Label smoothing for the BCE real target
    pub label_smoothing: f64,
    /// Gradient-penalty style: "none", "r1" or "wgan_gp"
    pub penalty: String,
    /// Weight of the WGAN-GP interpolation penalty
    pub lambda_gp: f64,
    /// Weight of the R1 penalty
    pub lambda_r1: f64,
}

/// Adaptive discriminator augmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaConfig {
    /// Whether ADA is active
    pub enabled: bool,
    /// Discriminator real-accuracy the controller steers towards
    pub target_acc: f64,
    /// Per-update adjustment applied to the augmentation probability
    pub adjustment_speed: f64,
    /// Upper bound for the augmentation probability
    pub max_prob: f64,
}

/// Optimizer configuration (one AdamW per network, never shared)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Generator learning rate
    pub gen_lr: f64,
    /// Discriminator learning rate
    pub disc_lr: f64,
    /// AdamW beta1
    pub beta1: f64,
    /// AdamW beta2
    pub beta2: f64,
    /// AdamW weight decay
    pub weight_decay: f64,
    /// Linear warmup length in optimizer steps
    pub warmup_steps: usize,
    /// Multiplicative per-epoch learning-rate decay
    pub epoch_decay: f64,
}

/// Training-loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of epochs
    pub epochs: usize,
    /// Emit a sample grid every N epochs
    pub sample_every: usize,
    /// Save a checkpoint every M epochs
    pub save_every: usize,
    /// Directory for sample grids
    pub sample_dir: String,
    /// Directory for checkpoints
    pub checkpoint_dir: String,
    /// Run forward/loss under a mixed-precision autocast scope
    pub mixed_precision: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 12,
            device: "cpu".to_string(),
            data: DataConfig {
                root_dir: "data/images".to_string(),
                image_size: 64,
                batch_size: 32,
            },
            model: ModelConfig {
                latent_dim: 128,
                channels: 3,
                gen_base_filters: 64,
                disc_base_filters: 64,
                disc_depth: 4,
                dropout: 0.3,
                activation: "elu".to_string(),
                norm: "batch".to_string(),
            },
            loss: LossConfig {
                criterion: "bce".to_string(),
                label_smoothing: 0.0,
                penalty: "none".to_string(),
                lambda_gp: 10.0,
                lambda_r1: 10.0,
            },
            ada: AdaConfig {
                enabled: true,
                target_acc: 0.6,
                adjustment_speed: 0.01,
                max_prob: 0.8,
            },
            optimizer: OptimizerConfig {
                gen_lr: 2e-4,
                disc_lr: 2e-4,
                beta1: 0.5,
                beta2: 0.999,
                weight_decay: 0.0,
                warmup_steps: 0,
                epoch_decay: 1.0,
            },
            training: TrainingConfig {
                epochs: 100,
                sample_every: 5,
                save_every: 10,
                sample_dir: "samples".to_string(),
                checkpoint_dir: "checkpoints".to_string(),
                mixed_precision: true,
            },
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_toml(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_toml(&self, path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from a path, dispatching on the extension.
    pub fn from_path(path: &str) -> anyhow::Result<Self> {
        if path.ends_with(".toml") {
            Self::from_toml(path)
        } else {
            Self::from_json(path)
        }
    }

    /// Get device from configuration
    pub fn get_device(&self) -> tch::Device {
        match self.device.to_lowercase().as_str() {
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    tch::Device::Cuda(0)
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    tch::Device::Cpu
                }
            }
            _ => tch::Device::Cpu,
        }
    }

    /// Generator configuration derived from this config.
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            latent_dim: self.model.latent_dim,
            image_size: self.data.image_size,
            channels: self.model.channels,
            base_filters: self.model.gen_base_filters,
            activation: self.model.activation.clone(),
            norm: self.model.norm.clone(),
        }
    }

    /// Discriminator configuration derived from this config.
    pub fn discriminator_config(&self) -> DiscriminatorConfig {
        DiscriminatorConfig {
            image_size: self.data.image_size,
            channels: self.model.channels,
            base_filters: self.model.disc_base_filters,
            depth: self.model.disc_depth,
            dropout: self.model.dropout,
            activation: self.model.activation.clone(),
        }
    }

    /// Validate configuration. Every selector string is parsed here so an
    /// unknown name fails at setup, not mid-training.
    pub fn validate(&self) -> TrainResult<()> {
        if self.data.batch_size == 0 {
            return Err(TrainError::config("batch size must be > 0"));
        }
        if self.model.latent_dim <= 0 {
            return Err(TrainError::config("latent dimension must be > 0"));
        }
        if self.model.disc_depth <= 0 {
            return Err(TrainError::config("discriminator depth must be > 0"));
        }
        if self.training.epochs == 0 {
            return Err(TrainError::config("number of epochs must be > 0"));
        }
        if self.training.sample_every == 0 || self.training.save_every == 0 {
            return Err(TrainError::config(
                "sample_every and save_every must be > 0",
            ));
        }
        if !(0.0..1.0).contains(&self.loss.label_smoothing) {
            return Err(TrainError::config("label smoothing must be in [0, 1)"));
        }
        if self.optimizer.gen_lr <= 0.0 || self.optimizer.disc_lr <= 0.0 {
            return Err(TrainError::config("learning rates must be > 0"));
        }
        if self.optimizer.epoch_decay <= 0.0 || self.optimizer.epoch_decay > 1.0 {
            return Err(TrainError::config("epoch decay must be in (0, 1]"));
        }

        self.model.activation.parse::<Activation>()?;
        self.model.norm.parse::<Norm>()?;
        let criterion: LossKind = self.loss.criterion.parse()?;
        let penalty: PenaltyKind = self.loss.penalty.parse()?;

        if penalty == PenaltyKind::WganGp && criterion != LossKind::WganGp {
            return Err(TrainError::config(
                "the interpolation gradient penalty requires the wgan_gp criterion",
            ));
        }
        if self.ada.enabled {
            if !(0.0..=1.0).contains(&self.ada.target_acc) {
                return Err(TrainError::config("ADA target accuracy must be in [0, 1]"));
            }
            if !(0.0..=1.0).contains(&self.ada.max_prob) {
                return Err(TrainError::config("ADA max probability must be in [0, 1]"));
            }
            if self.ada.adjustment_speed <= 0.0 {
                return Err(TrainError::config("ADA adjustment speed must be > 0"));
            }
        }
        Ok(())
    }
}

impl Default for AdaConfig {
    fn default() -> Self {
        Config::default().ada
    }
}

/// Create default configuration file if it doesn't exist
pub fn ensure_config_exists(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::from_path(path)
    } else {
        let config = Config::default();
        if path.ends_with(".toml") {
            config.save_toml(path)?;
        } else {
            config.save_json(path)?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.latent_dim, 128);
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let loaded: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.loss.criterion, loaded.loss.criterion);
        assert_eq!(config.model.latent_dim, loaded.model.latent_dim);
        assert_eq!(config.ada.target_acc, loaded.ada.target_acc);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let loaded: Config = toml::from_str(&text).unwrap();
        assert_eq!(config.optimizer.gen_lr, loaded.optimizer.gen_lr);
    }

    #[test]
    fn test_unknown_criterion_rejected() {
        let mut config = Config::default();
        config.loss.criterion = "hinge".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, TrainError::Configuration(_)));
    }

    #[test]
    fn test_unknown_activation_rejected() {
        let mut config = Config::default();
        config.model.activation = "gaussian".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wgan_penalty_requires_wgan_criterion() {
        let mut config = Config::default();
        config.loss.criterion = "bce".to_string();
        config.loss.penalty = "wgan_gp".to_string();
        assert!(config.validate().is_err());

        config.loss.criterion = "wgan_gp".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_numeric_ranges_rejected() {
        let mut config = Config::default();
        config.data.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ada.target_acc = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ensure_config_exists_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();
        let config = ensure_config_exists(path).unwrap();
        assert!(Path::new(path).exists());
        assert!(config.validate().is_ok());

        // Second call loads the same file.
        let again = ensure_config_exists(path).unwrap();
        assert_eq!(config.seed, again.seed);
    }
}
