//! GAN wrapper combining Generator and Discriminator
//!
//! Owns both networks and their variable stores. The training flag is shared
//! observable state: sampling flips it to inference and the caller must
//! restore it afterwards.

use tch::nn::OptimizerConfig as _;
use tch::{nn, nn::VarStore, Device, Kind, Tensor};

use super::discriminator::{Discriminator, DiscriminatorConfig};
use super::generator::{Generator, GeneratorConfig};
use crate::error::Result;
use crate::utils::config::OptimizerConfig;

/// Complete GAN model
pub struct Gan {
    /// Generator network
    pub generator: Generator,
    /// Discriminator network
    pub discriminator: Discriminator,
    /// Variable store for generator
    pub gen_vs: VarStore,
    /// Variable store for discriminator
    pub disc_vs: VarStore,
    /// Device (CPU/GPU)
    pub device: Device,
    training: bool,
}

impl Gan {
    /// Create a new GAN model
    pub fn new(
        gen_config: GeneratorConfig,
        disc_config: DiscriminatorConfig,
        device: Device,
    ) -> Result<Self> {
        let gen_vs = VarStore::new(device);
        let disc_vs = VarStore::new(device);

        let generator = Generator::new(&gen_vs.root(), gen_config)?;
        let discriminator = Discriminator::new(&disc_vs.root(), disc_config)?;

        Ok(Self {
            generator,
            discriminator,
            gen_vs,
            disc_vs,
            device,
            training: true,
        })
    }

    /// Build the generator optimizer (AdamW).
    pub fn gen_optimizer(&self, config: &OptimizerConfig) -> Result<nn::Optimizer> {
        let opt = nn::adamw(config.beta1, config.beta2, config.weight_decay)
            .build(&self.gen_vs, config.gen_lr)?;
        Ok(opt)
    }

    /// Build the discriminator optimizer (AdamW).
    pub fn disc_optimizer(&self, config: &OptimizerConfig) -> Result<nn::Optimizer> {
        let opt = nn::adamw(config.beta1, config.beta2, config.weight_decay)
            .build(&self.disc_vs, config.disc_lr)?;
        Ok(opt)
    }

    /// Generate images without tracking gradients, honoring the current
    /// train/eval mode.
    pub fn generate(&self, noise: &Tensor) -> Tensor {
        tch::no_grad(|| self.generator.forward_t(noise, self.training))
    }

    /// Generate `num_samples` images from fresh noise.
    pub fn generate_random(&self, num_samples: i64) -> Tensor {
        let latent_dim = self.generator.config().latent_dim;
        let noise = Tensor::randn([num_samples, latent_dim], (Kind::Float, self.device));
        self.generate(&noise)
    }

    /// Set model to training mode.
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Set model to evaluation mode.
    pub fn eval(&mut self) {
        self.training = false;
    }

    /// Whether the model is currently in training mode.
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Get latent dimension
    pub fn latent_dim(&self) -> i64 {
        self.generator.config().latent_dim
    }

    /// Get image side length
    pub fn image_size(&self) -> i64 {
        self.generator.config().image_size
    }

    /// Total trainable parameter count across both networks.
    pub fn num_parameters(&self) -> i64 {
        let count = |vs: &VarStore| {
            vs.trainable_variables()
                .iter()
                .map(|v| v.numel() as i64)
                .sum::<i64>()
        };
        count(&self.gen_vs) + count(&self.disc_vs)
    }

    /// Save model weights.
    pub fn save(&self, gen_path: &std::path::Path, disc_path: &std::path::Path) -> anyhow::Result<()> {
        self.gen_vs.save(gen_path)?;
        self.disc_vs.save(disc_path)?;
        Ok(())
    }

    /// Load model weights.
    pub fn load(&mut self, gen_path: &std::path::Path, disc_path: &std::path::Path) -> anyhow::Result<()> {
        self.gen_vs.load(gen_path)?;
        self.disc_vs.load(disc_path)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn small_test_gan(device: Device) -> Gan {
    let gen_config = GeneratorConfig {
        latent_dim: 8,
        image_size: 8,
        base_filters: 4,
        ..Default::default()
    };
    let disc_config = DiscriminatorConfig {
        image_size: 8,
        base_filters: 4,
        depth: 2,
        dropout: 0.0,
        ..Default::default()
    };
    Gan::new(gen_config, disc_config, device).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gan_creation() {
        let gan = small_test_gan(Device::Cpu);
        assert_eq!(gan.latent_dim(), 8);
        assert_eq!(gan.image_size(), 8);
        assert!(gan.num_parameters() > 0);
        assert!(gan.is_training());
    }

    #[test]
    fn test_gan_generate_shape() {
        let gan = small_test_gan(Device::Cpu);
        let samples = gan.generate_random(4);
        assert_eq!(samples.size(), vec![4, 3, 8, 8]);
    }

    #[test]
    fn test_gan_mode_toggle() {
        let mut gan = small_test_gan(Device::Cpu);
        gan.eval();
        assert!(!gan.is_training());
        gan.train();
        assert!(gan.is_training());
    }

    #[test]
    fn test_gan_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let gen_path = dir.path().join("g.pt");
        let disc_path = dir.path().join("d.pt");
        let gan = small_test_gan(Device::Cpu);
        gan.save(&gen_path, &disc_path).unwrap();

        let mut other = small_test_gan(Device::Cpu);
        other.load(&gen_path, &disc_path).unwrap();
    }
}
