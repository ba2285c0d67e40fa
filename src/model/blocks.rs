//! Shared building blocks for the generator and discriminator
//!
//! Activation and normalization selectors are resolved from configuration
//! strings once, at network construction. Unknown names are rejected there
//! so a bad config can never surface mid-training.

use std::str::FromStr;

use tch::Tensor;

use crate::error::TrainError;

/// Activation function selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    LeakyRelu,
    Elu,
    Silu,
}

impl Activation {
    pub fn apply(self, x: &Tensor) -> Tensor {
        match self {
            Activation::Relu => x.relu(),
            Activation::LeakyRelu => x.leaky_relu(),
            Activation::Elu => x.elu(),
            Activation::Silu => x.silu(),
        }
    }
}

impl FromStr for Activation {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relu" => Ok(Activation::Relu),
            "leaky_relu" => Ok(Activation::LeakyRelu),
            "elu" => Ok(Activation::Elu),
            "silu" | "swish" => Ok(Activation::Silu),
            other => Err(TrainError::config(format!(
                "unknown activation '{other}' (expected relu, leaky_relu, elu or silu)"
            ))),
        }
    }
}

/// Normalization selector for generator blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Norm {
    Batch,
    None,
}

impl FromStr for Norm {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch" => Ok(Norm::Batch),
            "none" => Ok(Norm::None),
            other => Err(TrainError::config(format!(
                "unknown normalization '{other}' (expected batch or none)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_activation_parse() {
        assert_eq!("relu".parse::<Activation>().unwrap(), Activation::Relu);
        assert_eq!("swish".parse::<Activation>().unwrap(), Activation::Silu);
        assert!("sigmoidal".parse::<Activation>().is_err());
    }

    #[test]
    fn test_unknown_norm_is_config_error() {
        let err = "spectral".parse::<Norm>().unwrap_err();
        assert!(matches!(err, TrainError::Configuration(_)));
    }

    #[test]
    fn test_activation_apply_shapes() {
        let x = Tensor::randn([2, 3], (Kind::Float, Device::Cpu));
        for act in [
            Activation::Relu,
            Activation::LeakyRelu,
            Activation::Elu,
            Activation::Silu,
        ] {
            assert_eq!(act.apply(&x).size(), vec![2, 3]);
        }
    }
}
