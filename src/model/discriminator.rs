//! Discriminator network
//!
//! Scores image realism with a single unbounded logit per sample. Stride-2
//! convolutions downsample the input; a pooled linear head produces the
//! logit. No sigmoid is applied here: the loss strategies interpret raw
//! logits directly.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

use super::blocks::Activation;
use crate::error::Result;

/// Discriminator network configuration
#[derive(Debug, Clone)]
pub struct DiscriminatorConfig {
    /// Input image side length
    pub image_size: i64,
    /// Input channels (3 for RGB)
    pub channels: i64,
    /// Base number of filters (doubled at every downsampling stage)
    pub base_filters: i64,
    /// Number of stride-2 convolution stages
    pub depth: i64,
    /// Dropout rate between stages
    pub dropout: f64,
    /// Activation selector ("relu", "leaky_relu", "elu", "silu")
    pub activation: String,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            image_size: 64,
            channels: 3,
            base_filters: 64,
            depth: 4,
            dropout: 0.3,
            activation: "leaky_relu".to_string(),
        }
    }
}

/// Discriminator network
///
/// Architecture:
/// 1. `depth` stride-2 Conv2d stages with activation and dropout
/// 2. Adaptive average pooling and a linear head to one logit
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    convs: Vec<nn::Conv2D>,
    fc: nn::Linear,
    activation: Activation,
}

impl Discriminator {
    /// Create a new Discriminator. Fails on an invalid activation selector.
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Result<Self> {
        let activation: Activation = config.activation.parse()?;

        let conv_config = nn::ConvConfig {
            stride: 2,
            padding: 1,
            bias: false,
            ..Default::default()
        };

        let mut convs = Vec::with_capacity(config.depth as usize);
        let mut in_channels = config.channels;
        for i in 0..config.depth {
            let out_channels = config.base_filters * (1 << i);
            convs.push(nn::conv2d(
                vs / format!("conv{i}"),
                in_channels,
                out_channels,
                4,
                conv_config,
            ));
            in_channels = out_channels;
        }

        let fc = nn::linear(vs / "fc", in_channels, 1, Default::default());

        Ok(Self {
            config,
            convs,
            fc,
            activation,
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape (batch_size, channels, image_size, image_size)
    /// * `train` - Whether in training mode (affects dropout)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, 1) with raw logits
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let mut x = input.shallow_clone();
        for conv in &self.convs {
            x = conv.forward(&x);
            x = self.activation.apply(&x);
            x = x.dropout(self.config.dropout, train);
        }
        let batch_size = x.size()[0];
        let x = x.adaptive_avg_pool2d([1, 1]).view([batch_size, -1]);
        self.fc.forward(&x)
    }

    /// Classify samples (inference mode): probability of being real.
    pub fn classify(&self, input: &Tensor) -> Tensor {
        self.forward_t(input, false).sigmoid()
    }

    /// Get configuration
    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }
}

impl ModuleT for Discriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Discriminator::forward_t(self, xs, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn test_discriminator_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let config = DiscriminatorConfig {
            image_size: 16,
            base_filters: 8,
            depth: 3,
            ..Default::default()
        };
        let disc = Discriminator::new(&vs.root(), config).unwrap();

        let input = Tensor::randn([4, 3, 16, 16], (Kind::Float, Device::Cpu));
        let output = disc.forward_t(&input, false);

        assert_eq!(output.size(), vec![4, 1]);
    }

    #[test]
    fn test_discriminator_classify_range() {
        let vs = VarStore::new(Device::Cpu);
        let config = DiscriminatorConfig {
            image_size: 8,
            base_filters: 4,
            depth: 2,
            ..Default::default()
        };
        let disc = Discriminator::new(&vs.root(), config).unwrap();

        let input = Tensor::randn([2, 3, 8, 8], (Kind::Float, Device::Cpu));
        let probs = disc.classify(&input);

        let min: f64 = probs.min().double_value(&[]);
        let max: f64 = probs.max().double_value(&[]);
        assert!(min >= 0.0 && max <= 1.0);
    }

    #[test]
    fn test_discriminator_rejects_bad_activation() {
        let vs = VarStore::new(Device::Cpu);
        let config = DiscriminatorConfig {
            activation: "step".to_string(),
            ..Default::default()
        };
        assert!(Discriminator::new(&vs.root(), config).is_err());
    }
}
