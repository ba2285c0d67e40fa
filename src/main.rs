//! GAN image synthesis trainer
//!
//! CLI entry point for:
//! - Training on an image folder
//! - Generating sample grids from a checkpoint
//! - Writing a default configuration file

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rust_image_gan::{
    data::{load_image_folder, DataLoader},
    model::Gan,
    training::Trainer,
    utils::{checkpoint, Config},
};

/// GAN training for image synthesis
#[derive(Parser)]
#[command(name = "image_gan")]
#[command(version = "0.1.0")]
#[command(about = "Train GANs on image folders and generate samples")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on an image folder
    Train {
        /// Image directory, overrides the configured one
        #[arg(short, long)]
        data: Option<String>,

        /// Number of epochs, overrides the configured one
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Resume from the latest checkpoint
        #[arg(long)]
        resume: bool,
    },

    /// Generate a sample grid from a trained checkpoint
    Sample {
        /// Checkpoint directory (defaults to the latest one)
        #[arg(short, long)]
        model: Option<String>,

        /// Output image path
        #[arg(short, long, default_value = "samples.png")]
        output: String,
    },

    /// Initialize default configuration file
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Train {
            data,
            epochs,
            resume,
        } => train(&cli.config, data, epochs, resume),
        Commands::Sample { model, output } => sample(&cli.config, model, &output),
        Commands::Init { output } => init_config(&output),
    }
}

fn load_config(config_path: &str) -> Result<Config> {
    let config = if Path::new(config_path).exists() {
        Config::from_path(config_path)?
    } else {
        info!("config file not found, using defaults");
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

fn train(
    config_path: &str,
    data: Option<String>,
    epochs: Option<usize>,
    resume: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(data) = data {
        config.data.root_dir = data;
    }
    if let Some(epochs) = epochs {
        config.training.epochs = epochs;
    }

    tch::manual_seed(config.seed);
    info!("using device: {:?}", config.get_device());

    let dataset = load_image_folder(Path::new(&config.data.root_dir), config.data.image_size)?;
    info!(
        "loaded {} images at {}x{}",
        dataset.shape()[0],
        config.data.image_size,
        config.data.image_size
    );

    let mut loader = DataLoader::new(dataset, config.data.batch_size, true, true)?;

    let mut trainer = Trainer::new(config)?;
    if resume {
        trainer.resume_latest()?;
    }

    let metrics = trainer.train(&mut loader)?;
    info!(
        "training complete, final G_loss: {:.4}, D_loss: {:.4}",
        metrics.latest_gen_loss().unwrap_or(0.0),
        metrics.latest_disc_loss().unwrap_or(0.0)
    );
    Ok(())
}

fn sample(config_path: &str, model: Option<String>, output: &str) -> Result<()> {
    let config = load_config(config_path)?;
    tch::manual_seed(config.seed);
    let device = config.get_device();

    let checkpoint_dir = match model {
        Some(dir) => std::path::PathBuf::from(dir),
        None => checkpoint::find_latest_checkpoint(Path::new(&config.training.checkpoint_dir))?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no checkpoints under {}, pass --model",
                    config.training.checkpoint_dir
                )
            })?,
    };

    let mut gan = Gan::new(
        config.generator_config(),
        config.discriminator_config(),
        device,
    )?;
    let (meta, _) = checkpoint::load_checkpoint(&mut gan, &checkpoint_dir)?;
    info!(
        "loaded checkpoint from {} (epoch {})",
        checkpoint_dir.display(),
        meta.epoch
    );

    gan.eval();
    let images = gan.generate_random(32);
    rust_image_gan::utils::save_sample_grid(&images, Path::new(output))?;
    info!("wrote sample grid to {output}");
    Ok(())
}

fn init_config(output: &str) -> Result<()> {
    rust_image_gan::utils::config::ensure_config_exists(output)?;
    info!("wrote default configuration to {output}");
    Ok(())
}
