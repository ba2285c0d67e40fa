//! Batching and iteration over the image dataset
//!
//! Holds the whole normalized dataset in memory as an NCHW array and hands
//! out owned batches, reshuffling at the start of every epoch.

use ndarray::{Array4, ArrayView4, Axis};
use rand::seq::SliceRandom;

use crate::error::{Result, TrainError};

/// DataLoader over a dataset of shape (num_images, channels, height, width)
pub struct DataLoader {
    data: Array4<f32>,
    batch_size: usize,
    /// Whether to shuffle data each epoch
    shuffle: bool,
    /// Whether to drop the last incomplete batch
    drop_last: bool,
    indices: Vec<usize>,
    current_idx: usize,
}

impl DataLoader {
    pub fn new(
        data: Array4<f32>,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(TrainError::config("batch size must be > 0"));
        }
        let num_samples = data.shape()[0];
        if num_samples == 0 {
            return Err(TrainError::config("dataset is empty"));
        }
        if drop_last && num_samples < batch_size {
            return Err(TrainError::config(format!(
                "dataset has {num_samples} images, fewer than one batch of {batch_size}"
            )));
        }

        let indices: Vec<usize> = (0..num_samples).collect();
        let mut loader = Self {
            data,
            batch_size,
            shuffle,
            drop_last,
            indices,
            current_idx: 0,
        };
        if shuffle {
            loader.shuffle_indices();
        }
        Ok(loader)
    }

    /// Number of batches per epoch
    pub fn num_batches(&self) -> usize {
        let num_samples = self.data.shape()[0];
        if self.drop_last {
            num_samples / self.batch_size
        } else {
            num_samples.div_ceil(self.batch_size)
        }
    }

    /// Total number of images
    pub fn num_samples(&self) -> usize {
        self.data.shape()[0]
    }

    /// Image shape as (channels, height, width)
    pub fn image_shape(&self) -> (usize, usize, usize) {
        let s = self.data.shape();
        (s[1], s[2], s[3])
    }

    fn shuffle_indices(&mut self) {
        let mut rng = rand::thread_rng();
        self.indices.shuffle(&mut rng);
    }

    /// Reset for a new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_indices();
        }
    }

    /// Next batch, `None` once the epoch is exhausted
    pub fn next_batch(&mut self) -> Option<Array4<f32>> {
        let num_samples = self.indices.len();
        let start = self.current_idx;
        if start >= num_samples {
            return None;
        }

        let end = (start + self.batch_size).min(num_samples);
        let actual_batch_size = end - start;
        if self.drop_last && actual_batch_size < self.batch_size {
            return None;
        }

        let (c, h, w) = self.image_shape();
        let mut batch = Array4::<f32>::zeros((actual_batch_size, c, h, w));
        for (batch_idx, &data_idx) in self.indices[start..end].iter().enumerate() {
            batch
                .index_axis_mut(Axis(0), batch_idx)
                .assign(&self.data.index_axis(Axis(0), data_idx));
        }

        self.current_idx = end;
        Some(batch)
    }

    /// Iterate over all batches of one epoch
    pub fn iter(&mut self) -> DataLoaderIter<'_> {
        self.reset();
        DataLoaderIter { loader: self }
    }

    /// View of the underlying data
    pub fn data(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }
}

/// Iterator adapter for DataLoader
pub struct DataLoaderIter<'a> {
    loader: &'a mut DataLoader,
}

impl Iterator for DataLoaderIter<'_> {
    type Item = Array4<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        self.loader.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_final_batch() {
        let data = Array4::<f32>::zeros((10, 3, 4, 4));
        let mut loader = DataLoader::new(data, 3, false, false).unwrap();

        assert_eq!(loader.num_batches(), 4);
        assert_eq!(loader.num_samples(), 10);

        let mut batch_count = 0;
        while let Some(batch) = loader.next_batch() {
            batch_count += 1;
            if batch_count < 4 {
                assert_eq!(batch.shape()[0], 3);
            } else {
                assert_eq!(batch.shape()[0], 1);
            }
        }
        assert_eq!(batch_count, 4);
    }

    #[test]
    fn test_drop_last() {
        let data = Array4::<f32>::zeros((10, 3, 4, 4));
        let mut loader = DataLoader::new(data, 3, false, true).unwrap();

        assert_eq!(loader.num_batches(), 3);
        let batches: Vec<_> = loader.iter().collect();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.shape()[0] == 3));
    }

    #[test]
    fn test_shuffle_covers_all_samples() {
        let mut data = Array4::<f32>::zeros((8, 1, 1, 1));
        for i in 0..8 {
            data[[i, 0, 0, 0]] = i as f32;
        }
        let mut loader = DataLoader::new(data, 2, true, false).unwrap();

        let mut seen: Vec<f32> = loader
            .iter()
            .flat_map(|b| b.iter().copied().collect::<Vec<_>>())
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, (0..8).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_rejects_empty_dataset() {
        let data = Array4::<f32>::zeros((0, 3, 4, 4));
        assert!(DataLoader::new(data, 4, false, false).is_err());
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let data = Array4::<f32>::zeros((4, 3, 4, 4));
        assert!(DataLoader::new(data, 0, false, false).is_err());
    }
}
