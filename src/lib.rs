//! # Image GAN Training
//!
//! This crate provides a modular GAN training system for image synthesis:
//! interchangeable adversarial loss families (standard BCE, Wasserstein
//! with gradient penalty, relativistic average), R1 and WGAN-GP gradient
//! penalties, adaptive discriminator augmentation and mixed-precision
//! updates with per-network loss scaling.
//!
//! ## Modules
//!
//! - `data`: Image folder loading and batching
//! - `model`: Generator and Discriminator architectures
//! - `training`: Losses, penalties, augmentation and the training loop
//! - `utils`: Configuration, checkpointing and sample rendering

pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{denormalize, load_image_folder, normalize, DataLoader};
pub use error::{Result, TrainError};
pub use model::{Discriminator, Gan, Generator};
pub use training::{AdaController, GanLoss, GradScaler, Trainer, TrainingMetrics};
pub use utils::{load_checkpoint, save_checkpoint, Config};
