//! Adaptive discriminator augmentation
//!
//! Tracks an exponential moving average of the discriminator's accuracy on
//! real images and nudges an augmentation probability `p` up when the
//! discriminator is winning too easily, down when it struggles. Only the
//! real batch is augmented, and only on its way into the discriminator;
//! generated images are scored and saved as produced.

use tch::{Kind, Tensor};

use crate::error::{Result, TrainError};
use crate::utils::config::AdaConfig;

const ROTATION_DEGREES: f64 = 10.0;
const TRANSLATE_FRAC: f64 = 0.1;
const JITTER_RANGE: f64 = 0.2;
const HUE_RANGE: f64 = 0.1;

/// Feedback controller over the augmentation probability.
#[derive(Debug)]
pub struct AdaController {
    target_acc: f64,
    adjustment_speed: f64,
    max_prob: f64,
    prob: f64,
    acc_ema: f64,
}

impl AdaController {
    pub fn new(config: &AdaConfig) -> Result<Self> {
        if !(0.0..1.0).contains(&config.target_acc) {
            return Err(TrainError::config(format!(
                "ADA target accuracy must be in (0, 1), got {}",
                config.target_acc
            )));
        }
        if config.adjustment_speed <= 0.0 {
            return Err(TrainError::config(format!(
                "ADA adjustment speed must be positive, got {}",
                config.adjustment_speed
            )));
        }
        if !(0.0..=1.0).contains(&config.max_prob) {
            return Err(TrainError::config(format!(
                "ADA max probability must be in [0, 1], got {}",
                config.max_prob
            )));
        }
        Ok(Self {
            target_acc: config.target_acc,
            adjustment_speed: config.adjustment_speed,
            max_prob: config.max_prob,
            prob: 0.0,
            acc_ema: 0.5,
        })
    }

    pub fn probability(&self) -> f64 {
        self.prob
    }

    pub fn accuracy_ema(&self) -> f64 {
        self.acc_ema
    }

    /// Restore controller state from a checkpoint.
    pub fn restore(&mut self, prob: f64, acc_ema: f64) {
        self.prob = prob.clamp(0.0, self.max_prob);
        self.acc_ema = acc_ema;
    }

    /// Fold this step's real-batch accuracy into the running average and
    /// adjust `p`. Returns the new probability. A non-finite accuracy is
    /// ignored so the controller state can never become NaN.
    pub fn update(&mut self, real_acc: f64) -> f64 {
        if !real_acc.is_finite() {
            tracing::warn!("ignoring non-finite discriminator accuracy {real_acc}");
            return self.prob;
        }
        self.acc_ema = 0.99 * self.acc_ema + 0.01 * real_acc;
        if self.acc_ema > self.target_acc {
            self.prob += self.adjustment_speed;
        } else {
            self.prob -= self.adjustment_speed;
        }
        self.prob = self.prob.clamp(0.0, self.max_prob);
        self.prob
    }

    /// Produce the augmented view of a batch for the discriminator.
    ///
    /// Samples are selected with probability `p`; each selected sample then
    /// runs through the composed transform where every primitive fires
    /// independently at the same `p`. The input is never modified. With
    /// `p == 0` the batch is returned as-is without drawing any random
    /// numbers, so disabling ADA leaves the RNG stream untouched.
    pub fn apply(&self, batch: &Tensor) -> Tensor {
        if self.prob == 0.0 {
            return batch.shallow_clone();
        }
        tch::no_grad(|| {
            let batch_size = batch.size()[0];
            let mask = Tensor::rand([batch_size], (Kind::Float, batch.device())).lt(self.prob);
            let indices = mask.nonzero().view([-1]);
            if indices.size()[0] == 0 {
                return batch.shallow_clone();
            }

            let mut selected = batch.index_select(0, &indices);
            augment_masked(&mut selected, self.prob, |x| x.flip([3]));
            augment_masked(&mut selected, self.prob, |x| x.flip([2]));
            augment_masked(&mut selected, self.prob, random_rotation);
            augment_masked(&mut selected, self.prob, color_jitter);
            augment_masked(&mut selected, self.prob, random_translate);

            let mut out = batch.detach().copy();
            let _ = out.index_copy_(0, &indices, &selected);
            out
        })
    }
}

/// Apply `transform` to a Bernoulli(p)-selected subset of the batch rows,
/// writing the transformed rows back in place.
fn augment_masked<F>(batch: &mut Tensor, prob: f64, transform: F)
where
    F: Fn(&Tensor) -> Tensor,
{
    let batch_size = batch.size()[0];
    let mask = Tensor::rand([batch_size], (Kind::Float, batch.device())).lt(prob);
    let indices = mask.nonzero().view([-1]);
    if indices.size()[0] == 0 {
        return;
    }
    let selected = batch.index_select(0, &indices);
    let transformed = transform(&selected);
    let _ = batch.index_copy_(0, &indices, &transformed);
}

/// Rotate each sample by an independent angle in [-10, 10] degrees.
fn random_rotation(batch: &Tensor) -> Tensor {
    let n = batch.size()[0];
    let device = batch.device();
    let degrees =
        Tensor::rand([n], (Kind::Float, device)) * (2.0 * ROTATION_DEGREES) - ROTATION_DEGREES;
    let radians = degrees * (std::f64::consts::PI / 180.0);
    let cos = radians.cos();
    let sin = radians.sin();
    let zero = Tensor::zeros([n], (Kind::Float, device));
    // Row-major [n, 2, 3] rotation matrices with no translation.
    let theta = Tensor::stack(
        &[
            Tensor::stack(&[&cos, &sin.neg(), &zero], 1),
            Tensor::stack(&[&sin, &cos, &zero], 1),
        ],
        1,
    );
    warp(batch, &theta)
}

/// Shift each sample by up to 10% of its extent in both axes.
fn random_translate(batch: &Tensor) -> Tensor {
    let n = batch.size()[0];
    let device = batch.device();
    let shift = |_: ()| {
        Tensor::rand([n], (Kind::Float, device)) * (2.0 * TRANSLATE_FRAC) - TRANSLATE_FRAC
    };
    let tx = shift(());
    let ty = shift(());
    let one = Tensor::ones([n], (Kind::Float, device));
    let zero = Tensor::zeros([n], (Kind::Float, device));
    let theta = Tensor::stack(
        &[
            Tensor::stack(&[&one, &zero, &tx], 1),
            Tensor::stack(&[&zero, &one, &ty], 1),
        ],
        1,
    );
    warp(batch, &theta)
}

fn warp(batch: &Tensor, theta: &Tensor) -> Tensor {
    let grid = Tensor::affine_grid_generator(theta, batch.size().as_slice(), false);
    // Bilinear sampling, zero padding outside the source extent.
    batch.grid_sampler(&grid, 0, 0, false)
}

/// Per-sample brightness, contrast, saturation and hue jitter, outputs
/// clamped back to the [-1, 1] image range.
fn color_jitter(batch: &Tensor) -> Tensor {
    let n = batch.size()[0];
    let device = batch.device();
    let factor = |_: ()| {
        (Tensor::rand([n, 1, 1, 1], (Kind::Float, device)) * (2.0 * JITTER_RANGE)
            + (1.0 - JITTER_RANGE))
    };
    let brightness = factor(());
    let contrast = factor(());
    let saturation = factor(());
    let mean = batch.mean_dim(Some([1i64, 2, 3].as_slice()), true, Kind::Float);
    let jittered = (batch * brightness - &mean) * contrast + mean;
    let gray = jittered.mean_dim(Some([1i64].as_slice()), true, Kind::Float);
    let jittered = (jittered - &gray) * saturation + gray;
    rotate_hue(&jittered).clamp(-1.0, 1.0)
}

/// Rotate each sample's colors about the gray axis by an independent angle
/// of up to `HUE_RANGE` turns of the color circle. The matrix fixes
/// (1, 1, 1), so gray pixels pass through unchanged. Non-RGB inputs are
/// returned as-is.
fn rotate_hue(batch: &Tensor) -> Tensor {
    let size = batch.size();
    let (n, channels) = (size[0], size[1]);
    if channels != 3 {
        return batch.shallow_clone();
    }
    let device = batch.device();
    let turns = Tensor::rand([n], (Kind::Float, device)) * (2.0 * HUE_RANGE) - HUE_RANGE;
    let radians = turns * (2.0 * std::f64::consts::PI);
    let cos = radians.cos();
    let sin = radians.sin();
    let k = (cos.neg() + 1.0) / 3.0;
    let t = &sin / 3f64.sqrt();
    let diag = &cos + &k;
    let lower = &k - &t;
    let upper = &k + &t;
    let matrices = Tensor::stack(
        &[
            Tensor::stack(&[&diag, &lower, &upper], 1),
            Tensor::stack(&[&upper, &diag, &lower], 1),
            Tensor::stack(&[&lower, &upper, &diag], 1),
        ],
        1,
    );
    let flat = batch.view([n, 3, -1]);
    matrices.bmm(&flat).view(size.as_slice())
}
