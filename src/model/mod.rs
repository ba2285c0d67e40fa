//! Model module containing GAN architecture components
//!
//! This module provides:
//! - Generator network mapping latent noise to images
//! - Discriminator network scoring image realism
//! - Gan wrapper combining both networks with their variable stores

mod blocks;
mod discriminator;
mod gan;
mod generator;

pub use blocks::{Activation, Norm};
pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use gan::Gan;
pub use generator::{Generator, GeneratorConfig};

#[cfg(test)]
pub(crate) use gan::small_test_gan;
