//! Generator network
//!
//! Maps latent noise vectors to RGB images in [-1, 1]. A dense projection
//! seeds a 4x4 feature map which is upsampled by stride-2 transposed
//! convolution blocks until the target image size is reached.

use tch::{nn, nn::Module, nn::ModuleT, Device, Kind, Tensor};

use super::blocks::{Activation, Norm};
use crate::error::{Result, TrainError};

/// Generator network configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Size of the latent noise vector
    pub latent_dim: i64,
    /// Output image side length (power of two, at least 8)
    pub image_size: i64,
    /// Output channels (3 for RGB)
    pub channels: i64,
    /// Base number of filters (doubled towards the 4x4 end)
    pub base_filters: i64,
    /// Activation selector ("relu", "leaky_relu", "elu", "silu")
    pub activation: String,
    /// Normalization selector ("batch", "none")
    pub norm: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            latent_dim: 128,
            image_size: 64,
            channels: 3,
            base_filters: 64,
            activation: "elu".to_string(),
            norm: "batch".to_string(),
        }
    }
}

/// One upsampling stage: transposed conv, optional batch norm, activation.
#[derive(Debug)]
struct UpBlock {
    conv: nn::ConvTranspose2D,
    bn: Option<nn::BatchNorm>,
    activation: Activation,
}

impl UpBlock {
    fn new(
        vs: &nn::Path,
        in_channels: i64,
        out_channels: i64,
        norm: Norm,
        activation: Activation,
    ) -> Self {
        let conv_config = nn::ConvTransposeConfig {
            stride: 2,
            padding: 1,
            bias: false,
            ..Default::default()
        };
        let conv = nn::conv_transpose2d(vs / "conv", in_channels, out_channels, 4, conv_config);
        let bn = match norm {
            Norm::Batch => Some(nn::batch_norm2d(vs / "bn", out_channels, Default::default())),
            Norm::None => None,
        };
        Self {
            conv,
            bn,
            activation,
        }
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        let x = self.conv.forward(x);
        let x = match &self.bn {
            Some(bn) => bn.forward_t(&x, train),
            None => x,
        };
        self.activation.apply(&x)
    }
}

/// Generator network
///
/// Architecture:
/// 1. Dense projection from latent space to a (base * 2^k, 4, 4) feature map
/// 2. Stride-2 transposed convolution blocks doubling the spatial size
/// 3. Final transposed convolution to `channels` with tanh activation
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    init_channels: i64,
    fc: nn::Linear,
    blocks: Vec<UpBlock>,
    to_rgb: nn::ConvTranspose2D,
}

impl Generator {
    /// Create a new Generator. Fails on an invalid activation, normalization
    /// or image size.
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Result<Self> {
        let activation: Activation = config.activation.parse()?;
        let norm: Norm = config.norm.parse()?;
        let ups = upsample_stages(config.image_size)?;

        // Channels halve at every upsampling stage, ending at base_filters
        // before the RGB head.
        let init_channels = config.base_filters * (1 << (ups - 1));
        let fc = nn::linear(
            vs / "fc",
            config.latent_dim,
            init_channels * 4 * 4,
            Default::default(),
        );

        let mut blocks = Vec::with_capacity(ups - 1);
        let mut in_channels = init_channels;
        for i in 0..ups - 1 {
            let out_channels = in_channels / 2;
            blocks.push(UpBlock::new(
                &(vs / format!("block{i}")),
                in_channels,
                out_channels,
                norm,
                activation,
            ));
            in_channels = out_channels;
        }

        // Final upsample to full resolution, no norm, tanh output.
        let conv_config = nn::ConvTransposeConfig {
            stride: 2,
            padding: 1,
            bias: false,
            ..Default::default()
        };
        let to_rgb =
            nn::conv_transpose2d(vs / "to_rgb", in_channels, config.channels, 4, conv_config);

        Ok(Self {
            config,
            init_channels,
            fc,
            blocks,
            to_rgb,
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `noise` - Tensor of shape (batch_size, latent_dim)
    /// * `train` - Whether in training mode (affects batch norm)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, channels, image_size, image_size) in [-1, 1]
    pub fn forward_t(&self, noise: &Tensor, train: bool) -> Tensor {
        let batch_size = noise.size()[0];
        let x = self.fc.forward(noise);
        let mut x = x.view([batch_size, self.init_channels, 4, 4]);
        for block in &self.blocks {
            x = block.forward_t(&x, train);
        }
        self.to_rgb.forward(&x).tanh()
    }

    /// Generate images (inference mode).
    pub fn generate(&self, noise: &Tensor) -> Tensor {
        self.forward_t(noise, false)
    }

    /// Generate images from fresh standard-normal noise.
    pub fn generate_random(&self, num_samples: i64, device: Device) -> Tensor {
        let noise = Tensor::randn([num_samples, self.config.latent_dim], (Kind::Float, device));
        self.generate(&noise)
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl ModuleT for Generator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Generator::forward_t(self, xs, train)
    }
}

/// Number of stride-2 upsampling stages needed to reach `image_size` from a
/// 4x4 seed. Rejects sizes that are not a power-of-two multiple of 4.
fn upsample_stages(image_size: i64) -> Result<usize> {
    if image_size < 8 {
        return Err(TrainError::config(format!(
            "image size {image_size} too small (minimum 8)"
        )));
    }
    let mut size = 4i64;
    let mut stages = 0usize;
    while size < image_size {
        size *= 2;
        stages += 1;
    }
    if size != image_size {
        return Err(TrainError::config(format!(
            "image size {image_size} is not a power-of-two multiple of 4"
        )));
    }
    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::nn::VarStore;

    #[test]
    fn test_generator_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            latent_dim: 16,
            image_size: 16,
            base_filters: 8,
            ..Default::default()
        };
        let gen = Generator::new(&vs.root(), config).unwrap();

        let noise = Tensor::randn([4, 16], (Kind::Float, Device::Cpu));
        let output = gen.forward_t(&noise, true);

        assert_eq!(output.size(), vec![4, 3, 16, 16]);
    }

    #[test]
    fn test_generator_output_range() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            latent_dim: 8,
            image_size: 8,
            base_filters: 4,
            ..Default::default()
        };
        let gen = Generator::new(&vs.root(), config).unwrap();

        let output = gen.generate_random(2, Device::Cpu);
        let min: f64 = output.min().double_value(&[]);
        let max: f64 = output.max().double_value(&[]);
        assert!(min >= -1.0 && max <= 1.0);
    }

    #[test]
    fn test_generator_rejects_bad_activation() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            activation: "maxout".to_string(),
            ..Default::default()
        };
        assert!(Generator::new(&vs.root(), config).is_err());
    }

    #[test]
    fn test_generator_rejects_bad_image_size() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            image_size: 48,
            ..Default::default()
        };
        let err = Generator::new(&vs.root(), config).unwrap_err();
        assert!(matches!(err, TrainError::Configuration(_)));
    }
}
