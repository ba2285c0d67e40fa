//! Loss scaling for mixed-precision updates
//!
//! Each network carries its own scaler: generator and discriminator losses
//! live on very different scales and an overflow in one must not shrink the
//! other's scale. A step whose gradients contain inf/NaN is skipped
//! entirely and the scale backed off; after a run of clean steps the scale
//! grows again.

use tch::nn::{Optimizer, VarStore};
use tch::{no_grad, Tensor};

use crate::error::Result;

const DEFAULT_INIT_SCALE: f64 = 65536.0;
const DEFAULT_GROWTH_FACTOR: f64 = 2.0;
const DEFAULT_BACKOFF_FACTOR: f64 = 0.5;
const DEFAULT_GROWTH_INTERVAL: u64 = 2000;
const MIN_SCALE: f64 = 1.0;

/// Dynamic loss scaler, one per optimized network.
#[derive(Debug)]
pub struct GradScaler {
    enabled: bool,
    scale: f64,
    growth_factor: f64,
    backoff_factor: f64,
    growth_interval: u64,
    successive_successes: u64,
    overflow_count: u64,
}

impl GradScaler {
    pub fn new(enabled: bool) -> Self {
        Self::with_params(
            enabled,
            DEFAULT_INIT_SCALE,
            DEFAULT_GROWTH_FACTOR,
            DEFAULT_BACKOFF_FACTOR,
            DEFAULT_GROWTH_INTERVAL,
        )
    }

    pub fn with_params(
        enabled: bool,
        init_scale: f64,
        growth_factor: f64,
        backoff_factor: f64,
        growth_interval: u64,
    ) -> Self {
        Self {
            enabled,
            scale: init_scale,
            growth_factor,
            backoff_factor,
            growth_interval,
            successive_successes: 0,
            overflow_count: 0,
        }
    }

    pub fn scale(&self) -> f64 {
        if self.enabled {
            self.scale
        } else {
            1.0
        }
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Run one optimizer update from `loss`: zero grads, backward through
    /// the scaled loss, check gradients for inf/NaN, unscale in place and
    /// step. Returns `true` if the step was applied, `false` if it was
    /// skipped because of an overflow.
    pub fn backward_step(
        &mut self,
        loss: &Tensor,
        optimizer: &mut Optimizer,
        vs: &VarStore,
    ) -> Result<bool> {
        optimizer.zero_grad();

        if !self.enabled {
            loss.backward();
            optimizer.step();
            return Ok(true);
        }

        let scaled = loss * self.scale;
        scaled.backward();

        let mut finite = true;
        no_grad(|| -> Result<()> {
            for var in vs.trainable_variables() {
                let mut grad = var.grad();
                if !grad.defined() {
                    continue;
                }
                if !bool::try_from(grad.isfinite().all())? {
                    finite = false;
                    break;
                }
                let _ = grad.f_mul_scalar_(1.0 / self.scale)?;
            }
            Ok(())
        })?;

        if finite {
            optimizer.step();
            self.record_success();
            Ok(true)
        } else {
            self.record_overflow();
            Ok(false)
        }
    }

    fn record_success(&mut self) {
        self.successive_successes += 1;
        if self.successive_successes >= self.growth_interval {
            self.scale *= self.growth_factor;
            self.successive_successes = 0;
        }
    }

    fn record_overflow(&mut self) {
        self.overflow_count += 1;
        self.successive_successes = 0;
        self.scale = (self.scale * self.backoff_factor).max(MIN_SCALE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::nn::{self, Module, OptimizerConfig};
    use tch::{Device, Kind};

    fn tiny_setup() -> (VarStore, nn::Linear, Optimizer) {
        let vs = VarStore::new(Device::Cpu);
        let layer = nn::linear(vs.root(), 4, 1, Default::default());
        let opt = nn::adam(0.9, 0.999, 0.0).build(&vs, 1e-2).unwrap();
        (vs, layer, opt)
    }

    #[test]
    fn test_disabled_scaler_reports_unit_scale() {
        let scaler = GradScaler::new(false);
        assert_eq!(scaler.scale(), 1.0);
    }

    #[test]
    fn test_finite_loss_applies_step() {
        let (vs, layer, mut opt) = tiny_setup();
        let mut scaler = GradScaler::new(true);

        let before = vs.trainable_variables()[0].copy();
        let input = Tensor::ones([2, 4], (Kind::Float, Device::Cpu));
        let loss = layer.forward(&input).square().mean(Kind::Float);

        let stepped = scaler.backward_step(&loss, &mut opt, &vs).unwrap();
        assert!(stepped);
        let after = &vs.trainable_variables()[0];
        assert!(!after.allclose(&before, 1e-12, 1e-12, false));
    }

    #[test]
    fn test_overflow_skips_step_and_backs_off() {
        let (vs, layer, mut opt) = tiny_setup();
        let mut scaler = GradScaler::new(true);
        let scale_before = scaler.scale();

        let before: Vec<Tensor> = vs.trainable_variables().iter().map(|v| v.copy()).collect();
        let input = Tensor::ones([2, 4], (Kind::Float, Device::Cpu)) * f64::INFINITY;
        let loss = layer.forward(&input).mean(Kind::Float);

        let stepped = scaler.backward_step(&loss, &mut opt, &vs).unwrap();
        assert!(!stepped);
        assert_eq!(scaler.overflow_count(), 1);
        assert!(scaler.scale() < scale_before);
        for (var, saved) in vs.trainable_variables().iter().zip(&before) {
            assert!(var.allclose(saved, 1e-12, 1e-12, false));
        }
    }

    #[test]
    fn test_scale_grows_after_interval() {
        let mut scaler = GradScaler::with_params(true, 8.0, 2.0, 0.5, 3);
        for _ in 0..3 {
            scaler.record_success();
        }
        assert_eq!(scaler.scale(), 16.0);
    }

    #[test]
    fn test_scale_never_drops_below_minimum() {
        let mut scaler = GradScaler::with_params(true, 2.0, 2.0, 0.5, 2000);
        for _ in 0..10 {
            scaler.record_overflow();
        }
        assert_eq!(scaler.scale(), 1.0);
    }

    #[test]
    fn test_overflow_resets_growth_streak() {
        let mut scaler = GradScaler::with_params(true, 8.0, 2.0, 0.5, 3);
        scaler.record_success();
        scaler.record_success();
        scaler.record_overflow();
        scaler.record_success();
        scaler.record_success();
        scaler.record_success();
        // Streak restarted after the overflow: 8 -> 4 -> 8.
        assert_eq!(scaler.scale(), 8.0);
    }
}
