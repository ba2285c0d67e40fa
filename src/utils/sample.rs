//! Sample grid rendering
//!
//! Tiles a batch of generator outputs into one image for eyeballing
//! training progress.

use std::path::Path;

use anyhow::bail;
use tch::Tensor;

use crate::data::denormalize;

const GRID_ROWS: i64 = 4;

/// Tile the first `rows * cols` images of a [-1, 1] NCHW batch into a
/// single CHW image, filling row by row.
pub fn to_grid(images: &Tensor, rows: i64) -> anyhow::Result<Tensor> {
    let size = images.size();
    let &[n, c, h, w] = size.as_slice() else {
        bail!("expected an NCHW batch, got shape {size:?}");
    };
    if rows <= 0 || n < rows {
        bail!("cannot tile {n} images into {rows} rows");
    }
    let cols = n / rows;

    let grid = images
        .narrow(0, 0, rows * cols)
        .view([rows, cols, c, h, w])
        .permute([2, 0, 3, 1, 4])
        .reshape([c, rows * h, cols * w]);
    Ok(grid)
}

/// Render a batch of generator outputs to a PNG on disk.
pub fn save_sample_grid(images: &Tensor, path: &Path) -> anyhow::Result<()> {
    let grid = to_grid(images, GRID_ROWS)?;
    tch::vision::image::save(&denormalize(&grid), path)?;
    Ok(())
}
