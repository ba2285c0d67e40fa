//! Loss strategies for GAN training
//!
//! All variants share the same two-method contract so the training loop is
//! variant-agnostic. The variant is resolved from its configuration name once
//! at setup; an unknown name is a configuration error there, never later.

use std::str::FromStr;

use tch::{Kind, Reduction, Tensor};

use crate::error::{Result, TrainError};
use crate::utils::config::LossConfig;

/// Mean binary cross-entropy on raw logits.
fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> Tensor {
    logits.binary_cross_entropy_with_logits::<Tensor>(targets, None, None, Reduction::Mean)
}

/// Adversarial loss strategy.
///
/// Both methods receive the fake and real logits of the current batch and
/// return a differentiable scalar. The WGAN-GP variant's gradient penalty is
/// deliberately NOT folded into `discriminator_loss`: the penalty needs the
/// sample tensors, not just logits, so the optimization step adds it.
pub trait GanLoss {
    /// Loss minimized by the generator.
    fn generator_loss(&self, fake_logits: &Tensor, real_logits: &Tensor) -> Tensor;

    /// Loss minimized by the discriminator.
    fn discriminator_loss(&self, fake_logits: &Tensor, real_logits: &Tensor) -> Tensor;
}

/// Closed set of loss variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    Bce,
    WganGp,
    Ragan,
}

impl FromStr for LossKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bce" => Ok(LossKind::Bce),
            "wgan_gp" => Ok(LossKind::WganGp),
            "ragan" => Ok(LossKind::Ragan),
            other => Err(TrainError::config(format!(
                "unknown loss criterion '{other}' (expected bce, wgan_gp or ragan)"
            ))),
        }
    }
}

/// Build the configured loss strategy.
pub fn build_loss(config: &LossConfig) -> Result<Box<dyn GanLoss + Send>> {
    let kind: LossKind = config.criterion.parse()?;
    Ok(match kind {
        LossKind::Bce => Box::new(BceLoss {
            label_smoothing: config.label_smoothing,
        }),
        LossKind::WganGp => Box::new(WassersteinLoss),
        LossKind::Ragan => Box::new(RelativisticAverageLoss),
    })
}

/// Standard non-saturating BCE objective.
///
/// Label smoothing softens the real target only; fake targets stay at zero.
#[derive(Debug, Clone)]
pub struct BceLoss {
    pub label_smoothing: f64,
}

impl GanLoss for BceLoss {
    fn generator_loss(&self, fake_logits: &Tensor, _real_logits: &Tensor) -> Tensor {
        let targets = Tensor::ones_like(fake_logits);
        bce_with_logits(fake_logits, &targets)
    }

    fn discriminator_loss(&self, fake_logits: &Tensor, real_logits: &Tensor) -> Tensor {
        let real_targets = Tensor::full_like(real_logits, 1.0 - self.label_smoothing);
        let fake_targets = Tensor::zeros_like(fake_logits);

        let real_loss = bce_with_logits(real_logits, &real_targets);
        let fake_loss = bce_with_logits(fake_logits, &fake_targets);

        (real_loss + fake_loss) * 0.5
    }
}

/// Wasserstein critic objective.
///
/// The interpolation gradient penalty is added by the caller; see
/// [`crate::training::penalty`].
#[derive(Debug, Clone)]
pub struct WassersteinLoss;

impl GanLoss for WassersteinLoss {
    fn generator_loss(&self, fake_logits: &Tensor, _real_logits: &Tensor) -> Tensor {
        -fake_logits.mean(Kind::Float)
    }

    fn discriminator_loss(&self, fake_logits: &Tensor, real_logits: &Tensor) -> Tensor {
        fake_logits.mean(Kind::Float) - real_logits.mean(Kind::Float)
    }
}

/// Relativistic average objective.
///
/// Generator and discriminator losses are label-swapped mirrors of the same
/// relativistic score.
#[derive(Debug, Clone)]
pub struct RelativisticAverageLoss;

impl GanLoss for RelativisticAverageLoss {
    fn generator_loss(&self, fake_logits: &Tensor, real_logits: &Tensor) -> Tensor {
        let real_rel = real_logits - fake_logits.mean(Kind::Float);
        let fake_rel = fake_logits - real_logits.mean(Kind::Float);

        let real_loss = bce_with_logits(&real_rel, &Tensor::ones_like(&real_rel));
        let fake_loss = bce_with_logits(&fake_rel, &Tensor::zeros_like(&fake_rel));

        real_loss + fake_loss
    }

    fn discriminator_loss(&self, fake_logits: &Tensor, real_logits: &Tensor) -> Tensor {
        let real_rel = real_logits - fake_logits.mean(Kind::Float);
        let fake_rel = fake_logits - real_logits.mean(Kind::Float);

        let real_loss = bce_with_logits(&real_rel, &Tensor::zeros_like(&real_rel));
        let fake_loss = bce_with_logits(&fake_rel, &Tensor::ones_like(&fake_rel));

        real_loss + fake_loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn logits(values: &[f32]) -> Tensor {
        Tensor::from_slice(values)
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .view([-1, 1])
    }

    #[test]
    fn test_bce_discriminator_loss_non_negative() {
        let loss = BceLoss {
            label_smoothing: 0.0,
        };
        let fake = Tensor::randn([8, 1], (Kind::Float, Device::Cpu));
        let real = Tensor::randn([8, 1], (Kind::Float, Device::Cpu));
        let d = loss.discriminator_loss(&fake, &real).double_value(&[]);
        assert!(d >= 0.0);
        assert!(d.is_finite());
    }

    #[test]
    fn test_bce_perfectly_separated_logits() {
        // Confident discriminator on real [+5, +5] and fake [-5, -5] pays
        // almost nothing; the generator pays heavily for those fakes.
        let loss = BceLoss {
            label_smoothing: 0.0,
        };
        let real = logits(&[5.0, 5.0]);
        let fake = logits(&[-5.0, -5.0]);

        let d = loss.discriminator_loss(&fake, &real).double_value(&[]);
        assert!(d < 0.05, "expected near-zero discriminator loss, got {d}");

        // -log(sigmoid(-5)) = softplus(5) ~ 5.007 per sample
        let g = loss.generator_loss(&fake, &real).double_value(&[]);
        assert!((g - 5.007).abs() < 0.05, "unexpected generator loss {g}");
    }

    #[test]
    fn test_bce_label_smoothing_softens_real_only() {
        let plain = BceLoss {
            label_smoothing: 0.0,
        };
        let smooth = BceLoss {
            label_smoothing: 0.1,
        };
        let real = logits(&[5.0, 5.0]);
        let fake = logits(&[-5.0, -5.0]);

        let d_plain = plain.discriminator_loss(&fake, &real).double_value(&[]);
        let d_smooth = smooth.discriminator_loss(&fake, &real).double_value(&[]);
        // Smoothed real target penalizes over-confident real logits.
        assert!(d_smooth > d_plain);

        let g_plain = plain.generator_loss(&fake, &real).double_value(&[]);
        let g_smooth = smooth.generator_loss(&fake, &real).double_value(&[]);
        assert!((g_plain - g_smooth).abs() < 1e-6);
    }

    #[test]
    fn test_wasserstein_losses() {
        let loss = WassersteinLoss;
        let fake = logits(&[1.0, 3.0]);
        let real = logits(&[2.0, 4.0]);

        let g = loss.generator_loss(&fake, &real).double_value(&[]);
        assert!((g + 2.0).abs() < 1e-6); // -mean([1, 3])

        let d = loss.discriminator_loss(&fake, &real).double_value(&[]);
        assert!((d + 1.0).abs() < 1e-6); // mean(fake) - mean(real) = 2 - 3
    }

    #[test]
    fn test_relativistic_label_swap_symmetry() {
        // Swapping the roles of fake and real logits in the generator loss
        // must reproduce the discriminator loss exactly.
        let loss = RelativisticAverageLoss;
        let fake = logits(&[-1.5, 0.3, 2.0]);
        let real = logits(&[0.7, 1.1, -0.2]);

        let d = loss.discriminator_loss(&fake, &real).double_value(&[]);
        let g_swapped = loss.generator_loss(&real, &fake).double_value(&[]);
        assert!((d - g_swapped).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_criterion_fails_at_setup() {
        let err = "lsgan".parse::<LossKind>().unwrap_err();
        assert!(matches!(err, TrainError::Configuration(_)));
    }

    #[test]
    fn test_build_loss_dispatch() {
        let mut config = LossConfig {
            criterion: "bce".to_string(),
            label_smoothing: 0.0,
            penalty: "none".to_string(),
            lambda_gp: 10.0,
            lambda_r1: 10.0,
        };
        assert!(build_loss(&config).is_ok());
        config.criterion = "ragan".to_string();
        assert!(build_loss(&config).is_ok());
        config.criterion = "nope".to_string();
        assert!(build_loss(&config).is_err());
    }
}
