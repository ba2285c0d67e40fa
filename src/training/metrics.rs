//! Training metrics for monitoring GAN progress

use crate::training::StepMetrics;

/// Per-epoch history, saved alongside checkpoints as CSV.
#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    /// Generator losses per epoch
    pub gen_losses: Vec<f64>,
    /// Discriminator losses per epoch
    pub disc_losses: Vec<f64>,
    /// Discriminator accuracy on real samples
    pub disc_real_acc: Vec<f64>,
    /// Discriminator accuracy on fake samples
    pub disc_fake_acc: Vec<f64>,
    /// Augmentation probability at the end of each epoch
    pub ada_probs: Vec<f64>,
    /// Optimizer steps skipped due to gradient overflow
    pub skipped_steps: Vec<u64>,
}

/// Summary of one epoch, as recorded into [`TrainingMetrics`].
#[derive(Debug, Clone, Copy)]
pub struct EpochMetrics {
    pub gen_loss: f64,
    pub disc_loss: f64,
    pub real_acc: f64,
    pub fake_acc: f64,
    pub ada_prob: f64,
    pub skipped_steps: u64,
}

impl TrainingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_epoch(&mut self, epoch: EpochMetrics) {
        self.gen_losses.push(epoch.gen_loss);
        self.disc_losses.push(epoch.disc_loss);
        self.disc_real_acc.push(epoch.real_acc);
        self.disc_fake_acc.push(epoch.fake_acc);
        self.ada_probs.push(epoch.ada_prob);
        self.skipped_steps.push(epoch.skipped_steps);
    }

    pub fn num_epochs(&self) -> usize {
        self.gen_losses.len()
    }

    pub fn latest_gen_loss(&self) -> Option<f64> {
        self.gen_losses.last().copied()
    }

    pub fn latest_disc_loss(&self) -> Option<f64> {
        self.disc_losses.last().copied()
    }

    /// Moving average of generator loss over the last `window` epochs
    pub fn gen_loss_ma(&self, window: usize) -> f64 {
        moving_average(&self.gen_losses, window)
    }

    /// Moving average of discriminator loss over the last `window` epochs
    pub fn disc_loss_ma(&self, window: usize) -> f64 {
        moving_average(&self.disc_losses, window)
    }

    /// Check if training appears to have collapsed
    ///
    /// Mode collapse indicators:
    /// - Discriminator loss very low (can easily distinguish)
    /// - Generator loss very high (can't fool discriminator)
    pub fn check_mode_collapse(&self, window: usize) -> bool {
        if self.num_epochs() < window {
            return false;
        }
        self.disc_loss_ma(window) < 0.1 && self.gen_loss_ma(window) > 5.0
    }

    /// Save metrics to CSV file
    pub fn save_csv(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        writer.write_record([
            "epoch",
            "gen_loss",
            "disc_loss",
            "real_acc",
            "fake_acc",
            "ada_prob",
            "skipped_steps",
        ])?;

        for i in 0..self.num_epochs() {
            writer.write_record([
                (i + 1).to_string(),
                self.gen_losses[i].to_string(),
                self.disc_losses[i].to_string(),
                self.disc_real_acc[i].to_string(),
                self.disc_fake_acc[i].to_string(),
                self.ada_probs[i].to_string(),
                self.skipped_steps[i].to_string(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load metrics from CSV file
    pub fn load_csv(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut metrics = Self::new();

        for result in reader.records() {
            let record = result?;
            metrics.gen_losses.push(record[1].parse()?);
            metrics.disc_losses.push(record[2].parse()?);
            metrics.disc_real_acc.push(record[3].parse()?);
            metrics.disc_fake_acc.push(record[4].parse()?);
            metrics.ada_probs.push(record[5].parse()?);
            metrics.skipped_steps.push(record[6].parse()?);
        }

        Ok(metrics)
    }
}

/// Accumulates per-step results within one epoch.
#[derive(Debug, Default)]
pub struct EpochTracker {
    gen_loss_sum: f64,
    disc_loss_sum: f64,
    real_acc_sum: f64,
    fake_acc_sum: f64,
    steps: u64,
    skipped: u64,
}

impl EpochTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: &StepMetrics) {
        self.gen_loss_sum += step.gen_loss;
        self.disc_loss_sum += step.disc_loss;
        self.real_acc_sum += step.real_acc;
        self.fake_acc_sum += step.fake_acc;
        self.steps += 1;
        if step.disc_skipped {
            self.skipped += 1;
        }
        if step.gen_skipped {
            self.skipped += 1;
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn summarize(&self, ada_prob: f64) -> EpochMetrics {
        let n = self.steps.max(1) as f64;
        EpochMetrics {
            gen_loss: self.gen_loss_sum / n,
            disc_loss: self.disc_loss_sum / n,
            real_acc: self.real_acc_sum / n,
            fake_acc: self.fake_acc_sum / n,
            ada_prob,
            skipped_steps: self.skipped,
        }
    }
}

/// Calculate moving average of last `window` values
fn moving_average(values: &[f64], window: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = window.min(values.len());
    let sum: f64 = values.iter().rev().take(n).sum();
    sum / n as f64
}
