//! Dataset loading and batching

pub mod dataset;
pub mod loader;

pub use dataset::{denormalize, load_image_folder, normalize};
pub use loader::DataLoader;
