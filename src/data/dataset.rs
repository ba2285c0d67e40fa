//! Image folder loading
//!
//! Reads every supported image under a directory, resizes to the training
//! resolution and normalizes pixel values to [-1, 1] to match the
//! generator's tanh output range.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use ndarray::{Array4, Ix4};
use tch::{Kind, Tensor};
use tracing::info;

const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// List the image files under `root`, descending into subdirectories,
/// sorted for deterministic ordering.
pub fn list_images(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    collect_images(root, &mut paths)?;
    paths.sort();
    Ok(paths)
}

fn collect_images(dir: &Path, paths: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("reading image directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(&path, paths)?;
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        if let Some(ext) = ext {
            if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
                paths.push(path);
            }
        }
    }
    Ok(())
}

/// Load an image folder into a normalized NCHW array.
pub fn load_image_folder(root: &Path, image_size: i64) -> anyhow::Result<Array4<f32>> {
    let paths = list_images(root)?;
    if paths.is_empty() {
        bail!("no images found under {}", root.display());
    }
    info!("loading {} images from {}", paths.len(), root.display());

    let mut images = Vec::with_capacity(paths.len());
    for path in &paths {
        let image = tch::vision::image::load_and_resize(path, image_size, image_size)
            .with_context(|| format!("loading {}", path.display()))?;
        images.push(normalize(&ensure_rgb(image)));
    }

    let stacked = Tensor::stack(&images, 0);
    let array: ndarray::ArrayD<f32> = (&stacked).try_into()?;
    Ok(array.into_dimensionality::<Ix4>()?)
}

fn ensure_rgb(image: Tensor) -> Tensor {
    if image.size()[0] == 1 {
        image.repeat([3, 1, 1])
    } else {
        image
    }
}

/// Map uint8 pixels to [-1, 1] floats.
pub fn normalize(image: &Tensor) -> Tensor {
    image.to_kind(Kind::Float) / 127.5 - 1.0
}

/// Map [-1, 1] floats back to uint8 pixels.
pub fn denormalize(image: &Tensor) -> Tensor {
    ((image + 1.0) * 127.5)
        .clamp(0.0, 255.0)
        .to_kind(Kind::Uint8)
}
