//! Learning-rate schedule
//!
//! Linear warmup over the first `warmup_steps` batches, then a flat rate
//! that decays multiplicatively once per epoch. Applied to an optimizer via
//! `set_lr`, so generator and discriminator each get their own schedule.

use tch::nn::Optimizer;

use crate::error::{Result, TrainError};

#[derive(Debug)]
pub struct LrSchedule {
    base_lr: f64,
    warmup_steps: u64,
    epoch_decay: f64,
    step_count: u64,
    decay_factor: f64,
}

impl LrSchedule {
    pub fn new(base_lr: f64, warmup_steps: u64, epoch_decay: f64) -> Result<Self> {
        if base_lr <= 0.0 {
            return Err(TrainError::config(format!(
                "learning rate must be positive, got {base_lr}"
            )));
        }
        if epoch_decay <= 0.0 || epoch_decay > 1.0 {
            return Err(TrainError::config(format!(
                "epoch decay must be in (0, 1], got {epoch_decay}"
            )));
        }
        Ok(Self {
            base_lr,
            warmup_steps,
            epoch_decay,
            step_count: 0,
            decay_factor: 1.0,
        })
    }

    pub fn current_lr(&self) -> f64 {
        let warmup = if self.warmup_steps == 0 || self.step_count >= self.warmup_steps {
            1.0
        } else {
            (self.step_count + 1) as f64 / self.warmup_steps as f64
        };
        self.base_lr * warmup * self.decay_factor
    }

    /// Advance one batch and push the resulting rate into the optimizer.
    pub fn step(&mut self, optimizer: &mut Optimizer) {
        optimizer.set_lr(self.current_lr());
        self.step_count += 1;
    }

    /// Apply the end-of-epoch decay.
    pub fn epoch_step(&mut self, optimizer: &mut Optimizer) {
        self.decay_factor *= self.epoch_decay;
        optimizer.set_lr(self.current_lr());
    }
}
