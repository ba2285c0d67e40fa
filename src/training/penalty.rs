//! Gradient penalties for discriminator regularization
//!
//! Both styles need a second differentiable backward pass through the
//! discriminator: the gradient of the logits with respect to the input
//! samples is itself part of the loss. `run_backward` with `create_graph`
//! provides that; misuse of the graph (untracked inputs, freed graph)
//! surfaces as `InvalidGraphState` and aborts the step.
//!
//! At most one penalty style is active per run, enforced at config time.

use std::str::FromStr;

use tch::{Kind, Tensor};

use crate::error::{Result, TrainError};
use crate::utils::config::LossConfig;

/// Closed set of gradient-penalty styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyKind {
    None,
    R1,
    WganGp,
}

impl FromStr for PenaltyKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(PenaltyKind::None),
            "r1" => Ok(PenaltyKind::R1),
            "wgan_gp" => Ok(PenaltyKind::WganGp),
            other => Err(TrainError::config(format!(
                "unknown gradient penalty '{other}' (expected none, r1 or wgan_gp)"
            ))),
        }
    }
}

/// Configured gradient penalty, applied during the discriminator sub-step.
#[derive(Debug, Clone, Copy)]
pub enum GradientPenalty {
    None,
    R1 { lambda: f64 },
    WganGp { lambda: f64 },
}

impl GradientPenalty {
    /// Resolve the penalty from configuration.
    pub fn from_config(config: &LossConfig) -> Result<Self> {
        Ok(match config.penalty.parse::<PenaltyKind>()? {
            PenaltyKind::None => GradientPenalty::None,
            PenaltyKind::R1 => GradientPenalty::R1 {
                lambda: config.lambda_r1,
            },
            PenaltyKind::WganGp => GradientPenalty::WganGp {
                lambda: config.lambda_gp,
            },
        })
    }

    /// Whether the real batch must have gradient tracking enabled before the
    /// discriminator forward pass.
    pub fn requires_input_grad(&self) -> bool {
        matches!(self, GradientPenalty::R1 { .. })
    }

    /// Compute the penalty term for this batch, if any.
    ///
    /// `discriminator` is the forward closure used for the extra WGAN-GP
    /// evaluation at interpolated samples; `real_logits` are the logits the
    /// discriminator already produced on `real_samples` this step (used by
    /// R1, which differentiates the existing graph instead of re-running the
    /// forward pass).
    pub fn compute<F>(
        &self,
        discriminator: F,
        fake_samples: &Tensor,
        real_samples: &Tensor,
        real_logits: &Tensor,
    ) -> Result<Option<Tensor>>
    where
        F: Fn(&Tensor) -> Tensor,
    {
        match *self {
            GradientPenalty::None => Ok(None),
            GradientPenalty::R1 { lambda } => {
                r1_penalty(real_logits, real_samples, lambda).map(Some)
            }
            GradientPenalty::WganGp { lambda } => {
                interpolated_gradient_penalty(discriminator, fake_samples, real_samples, lambda)
                    .map(Some)
            }
        }
    }
}

/// WGAN-GP interpolation penalty.
///
/// Samples per-example mixing coefficients, evaluates the discriminator at
/// the interpolated points, and penalizes the squared deviation of the
/// per-example input-gradient norm from 1.
pub fn interpolated_gradient_penalty<F>(
    discriminator: F,
    fake_samples: &Tensor,
    real_samples: &Tensor,
    lambda: f64,
) -> Result<Tensor>
where
    F: Fn(&Tensor) -> Tensor,
{
    let batch_size = real_samples.size()[0];
    let device = real_samples.device();

    let alpha = Tensor::rand([batch_size, 1, 1, 1], (Kind::Float, device));
    let interpolated = (fake_samples.detach() + &alpha * (real_samples.detach() - fake_samples.detach()))
        .detach()
        .set_requires_grad(true);

    let logits = discriminator(&interpolated);
    if !logits.requires_grad() {
        return Err(TrainError::InvalidGraphState(
            "discriminator output does not track gradients".to_string(),
        ));
    }

    let grads = Tensor::f_run_backward(
        &[logits.sum(Kind::Float)],
        &[&interpolated],
        true,
        true,
    )
    .map_err(|e| TrainError::InvalidGraphState(e.to_string()))?;

    let flat = grads[0].reshape([batch_size, -1]);
    let norm = flat
        .square()
        .sum_dim_intlist([1i64].as_slice(), false, Kind::Float)
        .sqrt();
    Ok((norm - 1.0).square().mean(Kind::Float) * lambda)
}

/// R1 penalty: squared input-gradient norm at real samples only, no
/// interpolation.
///
/// `real_samples` must have been marked for gradient tracking before the
/// forward pass that produced `real_logits`.
pub fn r1_penalty(real_logits: &Tensor, real_samples: &Tensor, lambda: f64) -> Result<Tensor> {
    if !real_samples.requires_grad() {
        return Err(TrainError::InvalidGraphState(
            "R1 penalty requested but real samples do not track gradients".to_string(),
        ));
    }
    let batch_size = real_samples.size()[0];

    let grads = Tensor::f_run_backward(
        &[real_logits.sum(Kind::Float)],
        &[real_samples],
        true,
        true,
    )
    .map_err(|e| TrainError::InvalidGraphState(e.to_string()))?;

    let flat = grads[0].reshape([batch_size, -1]);
    let sq_norm = flat.square().sum_dim_intlist([1i64].as_slice(), false, Kind::Float);
    Ok(sq_norm.mean(Kind::Float) * lambda)
}
