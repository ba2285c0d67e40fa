//! Configuration, checkpointing and sample rendering

pub mod checkpoint;
pub mod config;
pub mod sample;

pub use checkpoint::{find_latest_checkpoint, load_checkpoint, save_checkpoint, CheckpointMeta};
pub use config::Config;
pub use sample::save_sample_grid;
