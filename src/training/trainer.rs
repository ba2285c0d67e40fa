//! Adversarial training loop
//!
//! Alternates discriminator and generator updates over the data loader, one
//! optimizer step each per batch, discriminator first. The generator update
//! runs against the just-updated discriminator with its parameters frozen,
//! so generator gradients never leak into discriminator weights. Each
//! network has its own loss scaler, learning-rate schedule and optimizer.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tch::nn::ModuleT;
use tch::{Device, Kind, Tensor};
use tracing::{info, warn};

use crate::data::DataLoader;
use crate::error::Result;
use crate::model::Gan;
use crate::training::ada::AdaController;
use crate::training::losses::{build_loss, GanLoss};
use crate::training::metrics::{EpochTracker, TrainingMetrics};
use crate::training::penalty::GradientPenalty;
use crate::training::scaler::GradScaler;
use crate::training::scheduler::LrSchedule;
use crate::utils::checkpoint::{self, CheckpointMeta};
use crate::utils::config::Config;
use crate::utils::sample::save_sample_grid;

/// Number of images rendered into each progress sample sheet.
const SAMPLE_COUNT: i64 = 32;

/// Results of one combined discriminator + generator step.
#[derive(Debug, Clone, Copy)]
pub struct StepMetrics {
    pub gen_loss: f64,
    pub disc_loss: f64,
    pub real_acc: f64,
    pub fake_acc: f64,
    pub ada_prob: f64,
    pub disc_skipped: bool,
    pub gen_skipped: bool,
}

struct DiscOutcome {
    loss: f64,
    real_acc: f64,
    fake_acc: f64,
    real_logits: Tensor,
    noise: Tensor,
    skipped: bool,
}

/// Owns the networks, optimizers and controllers for one training run.
pub struct Trainer {
    config: Config,
    device: Device,
    gan: Gan,
    criterion: Box<dyn GanLoss + Send>,
    penalty: GradientPenalty,
    ada: Option<AdaController>,
    gen_opt: tch::nn::Optimizer,
    disc_opt: tch::nn::Optimizer,
    gen_sched: LrSchedule,
    disc_sched: LrSchedule,
    gen_scaler: GradScaler,
    disc_scaler: GradScaler,
    metrics: TrainingMetrics,
    amp: bool,
    start_epoch: usize,
}

impl Trainer {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let device = config.get_device();
        let gan = Gan::new(
            config.generator_config(),
            config.discriminator_config(),
            device,
        )?;
        info!("model has {} trainable parameters", gan.num_parameters());

        let criterion = build_loss(&config.loss)?;
        let penalty = GradientPenalty::from_config(&config.loss)?;
        let ada = if config.ada.enabled {
            Some(AdaController::new(&config.ada)?)
        } else {
            None
        };

        let gen_opt = gan.gen_optimizer(&config.optimizer)?;
        let disc_opt = gan.disc_optimizer(&config.optimizer)?;
        let gen_sched = LrSchedule::new(
            config.optimizer.gen_lr,
            config.optimizer.warmup_steps as u64,
            config.optimizer.epoch_decay,
        )?;
        let disc_sched = LrSchedule::new(
            config.optimizer.disc_lr,
            config.optimizer.warmup_steps as u64,
            config.optimizer.epoch_decay,
        )?;

        let amp = config.training.mixed_precision && device.is_cuda();
        let gen_scaler = GradScaler::new(amp);
        let disc_scaler = GradScaler::new(amp);

        Ok(Self {
            config,
            device,
            gan,
            criterion,
            penalty,
            ada,
            gen_opt,
            disc_opt,
            gen_sched,
            disc_sched,
            gen_scaler,
            disc_scaler,
            metrics: TrainingMetrics::new(),
            amp,
            start_epoch: 0,
        })
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    pub fn gan(&self) -> &Gan {
        &self.gan
    }

    /// Resume from the newest checkpoint under the configured directory, if
    /// one exists. Returns the epoch training will continue from.
    pub fn resume_latest(&mut self) -> anyhow::Result<usize> {
        let root = Path::new(&self.config.training.checkpoint_dir);
        let Some(dir) = checkpoint::find_latest_checkpoint(root)? else {
            return Ok(0);
        };
        let (meta, metrics) = checkpoint::load_checkpoint(&mut self.gan, &dir)?;
        if let Some(ada) = &mut self.ada {
            ada.restore(meta.ada_prob, meta.ada_acc_ema);
        }
        self.metrics = metrics;
        self.start_epoch = meta.epoch;
        info!("resumed from {} at epoch {}", dir.display(), meta.epoch);
        Ok(meta.epoch)
    }

    /// Run the full training schedule.
    pub fn train(&mut self, loader: &mut DataLoader) -> anyhow::Result<&TrainingMetrics> {
        let epochs = self.config.training.epochs;
        let num_batches = loader.num_batches();
        info!(
            "training for {} epochs, {} batches per epoch on {:?}",
            epochs, num_batches, self.device
        );

        std::fs::create_dir_all(&self.config.training.checkpoint_dir)?;
        std::fs::create_dir_all(&self.config.training.sample_dir)?;

        self.gan.train();
        for epoch in self.start_epoch..epochs {
            let epoch_start = std::time::Instant::now();
            let mut tracker = EpochTracker::new();

            let pb = ProgressBar::new(num_batches as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap()
                    .progress_chars("##-"),
            );

            for real_batch in loader.iter() {
                let real = Tensor::try_from(real_batch)?.to_device(self.device);
                let step = self.train_step(&real)?;
                tracker.push(&step);
                pb.set_message(format!(
                    "G: {:.4}, D: {:.4}, p: {:.2}",
                    step.gen_loss, step.disc_loss, step.ada_prob
                ));
                pb.inc(1);
            }
            pb.finish_with_message("done");
            loader.reset();

            self.gen_sched.epoch_step(&mut self.gen_opt);
            self.disc_sched.epoch_step(&mut self.disc_opt);

            let ada_prob = self.ada.as_ref().map_or(0.0, |a| a.probability());
            let summary = tracker.summarize(ada_prob);
            self.metrics.record_epoch(summary);

            info!(
                "epoch {}/{}: G_loss={:.4}, D_loss={:.4}, real_acc={:.2}%, fake_acc={:.2}%, ada_p={:.3}, skipped={}, took {:.1}s",
                epoch + 1,
                epochs,
                summary.gen_loss,
                summary.disc_loss,
                summary.real_acc * 100.0,
                summary.fake_acc * 100.0,
                summary.ada_prob,
                summary.skipped_steps,
                epoch_start.elapsed().as_secs_f64(),
            );

            if self.metrics.check_mode_collapse(10) {
                warn!("possible mode collapse, consider adjusting learning rates");
            }

            if (epoch + 1) % self.config.training.sample_every == 0 {
                self.write_samples(epoch + 1)?;
            }
            if (epoch + 1) % self.config.training.save_every == 0 {
                self.save_checkpoint(epoch + 1)?;
            }
        }

        self.save_checkpoint(epochs)?;
        Ok(&self.metrics)
    }

    /// One discriminator update followed by one generator update.
    pub fn train_step(&mut self, real: &Tensor) -> Result<StepMetrics> {
        let disc = self.discriminator_step(real)?;

        let ada_prob = match &mut self.ada {
            Some(ada) => ada.update(disc.real_acc),
            None => 0.0,
        };

        let (gen_loss, gen_skipped) = self.generator_step(&disc.noise, &disc.real_logits)?;

        self.gen_sched.step(&mut self.gen_opt);
        self.disc_sched.step(&mut self.disc_opt);

        Ok(StepMetrics {
            gen_loss,
            disc_loss: disc.loss,
            real_acc: disc.real_acc,
            fake_acc: disc.fake_acc,
            ada_prob,
            disc_skipped: disc.skipped,
            gen_skipped,
        })
    }

    fn discriminator_step(&mut self, real: &Tensor) -> Result<DiscOutcome> {
        let batch_size = real.size()[0];
        let noise = Tensor::randn([batch_size, self.gan.latent_dim()], (Kind::Float, self.device));

        let fake = tch::no_grad(|| {
            tch::autocast(self.amp, || self.gan.generator.forward_t(&noise, true))
        });

        // Augmentation applies to the real batch only; the discriminator
        // scores fakes exactly as the generator produced them.
        let real_view = match &self.ada {
            Some(ada) => ada.apply(real),
            None => real.shallow_clone(),
        };
        let real_view = if self.penalty.requires_input_grad() {
            real_view.set_requires_grad(true)
        } else {
            real_view
        };

        let (real_logits, fake_logits) = tch::autocast(self.amp, || {
            (
                self.gan.discriminator.forward_t(&real_view, true),
                self.gan.discriminator.forward_t(&fake, true),
            )
        });

        let mut d_loss = self.criterion.discriminator_loss(&fake_logits, &real_logits);
        // Penalties run in full precision; half-precision double backward is
        // numerically unreliable.
        if let Some(term) = self.penalty.compute(
            |x| self.gan.discriminator.forward_t(x, true),
            &fake,
            &real_view,
            &real_logits,
        )? {
            d_loss = d_loss + term;
        }

        let stepped = self
            .disc_scaler
            .backward_step(&d_loss, &mut self.disc_opt, &self.gan.disc_vs)?;

        // Accuracy proxy from the sign of a bounded transform of the
        // logits; diagnostics only, never part of a loss.
        let (real_acc, fake_acc) = tch::no_grad(|| {
            let real_acc = real_logits
                .tanh()
                .ge(0.0)
                .to_kind(Kind::Float)
                .mean(Kind::Float)
                .double_value(&[]);
            let fake_acc = fake_logits
                .tanh()
                .lt(0.0)
                .to_kind(Kind::Float)
                .mean(Kind::Float)
                .double_value(&[]);
            (real_acc, fake_acc)
        });

        Ok(DiscOutcome {
            loss: d_loss.double_value(&[]),
            real_acc,
            fake_acc,
            real_logits: real_logits.detach(),
            noise,
            skipped: !stepped,
        })
    }

    /// Generator update against the frozen, just-updated discriminator.
    /// Reuses the discriminator step's noise vector for a fresh generator
    /// forward (the earlier fake images were detached); `real_logits` are
    /// the detached logits from before the discriminator update, consumed
    /// by the relativistic loss.
    fn generator_step(&mut self, noise: &Tensor, real_logits: &Tensor) -> Result<(f64, bool)> {
        self.gan.disc_vs.freeze();
        let result = self.run_generator_update(noise, real_logits);
        self.gan.disc_vs.unfreeze();
        result
    }

    fn run_generator_update(&mut self, noise: &Tensor, real_logits: &Tensor) -> Result<(f64, bool)> {
        let g_loss = tch::autocast(self.amp, || {
            let fake = self.gan.generator.forward_t(noise, true);
            let fake_logits = self.gan.discriminator.forward_t(&fake, true);
            self.criterion.generator_loss(&fake_logits, real_logits)
        });

        let stepped = self
            .gen_scaler
            .backward_step(&g_loss, &mut self.gen_opt, &self.gan.gen_vs)?;
        Ok((g_loss.double_value(&[]), stepped))
    }

    /// Render a fresh-noise batch into a grid image on disk. Training mode
    /// is restored to whatever it was before the call, and the samples
    /// bypass augmentation entirely.
    pub fn write_samples(&mut self, epoch: usize) -> anyhow::Result<()> {
        let was_training = self.gan.is_training();
        self.gan.eval();
        let images = self.gan.generate_random(SAMPLE_COUNT);
        if was_training {
            self.gan.train();
        }

        let path = Path::new(&self.config.training.sample_dir)
            .join(format!("epoch_{epoch:04}.png"));
        save_sample_grid(&images, &path)?;
        info!("wrote samples to {}", path.display());
        Ok(())
    }

    fn save_checkpoint(&self, epoch: usize) -> anyhow::Result<()> {
        let (ada_prob, ada_acc_ema) = match &self.ada {
            Some(ada) => (ada.probability(), ada.accuracy_ema()),
            None => (0.0, 0.5),
        };
        let meta = CheckpointMeta::new(epoch, ada_prob, ada_acc_ema);
        let dir = checkpoint::save_checkpoint(
            &self.gan,
            &meta,
            &self.metrics,
            Path::new(&self.config.training.checkpoint_dir),
        )?;
        info!("saved checkpoint to {}", dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::Config;

    fn small_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.model.latent_dim = 8;
        config.model.gen_base_filters = 4;
        config.model.disc_base_filters = 4;
        config.model.disc_depth = 2;
        config.model.dropout = 0.0;
        config.data.image_size = 8;
        config.data.batch_size = 4;
        config.training.epochs = 1;
        config.training.mixed_precision = false;
        config.training.checkpoint_dir = dir.join("ckpt").to_string_lossy().into_owned();
        config.training.sample_dir = dir.join("samples").to_string_lossy().into_owned();
        config
    }

    fn real_batch() -> Tensor {
        Tensor::rand([4, 3, 8, 8], (Kind::Float, Device::Cpu)) * 2.0 - 1.0
    }

    #[test]
    fn test_train_step_produces_finite_losses() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(small_config(dir.path())).unwrap();
        let step = trainer.train_step(&real_batch()).unwrap();
        assert!(step.gen_loss.is_finite());
        assert!(step.disc_loss.is_finite());
        assert!((0.0..=1.0).contains(&step.real_acc));
        assert!((0.0..=1.0).contains(&step.fake_acc));
    }

    #[test]
    fn test_generator_step_leaves_discriminator_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(small_config(dir.path())).unwrap();

        // Run the discriminator step, snapshot D weights and gradients,
        // then run only the generator update.
        let disc = trainer.discriminator_step(&real_batch()).unwrap();
        let before: Vec<Tensor> = trainer
            .gan
            .disc_vs
            .trainable_variables()
            .iter()
            .map(|v| v.copy())
            .collect();
        let grads_before: Vec<Tensor> = trainer
            .gan
            .disc_vs
            .trainable_variables()
            .iter()
            .map(|v| v.grad().copy())
            .collect();

        trainer.generator_step(&disc.noise, &disc.real_logits).unwrap();

        for (var, saved) in trainer.gan.disc_vs.trainable_variables().iter().zip(&before) {
            assert!(var.allclose(saved, 1e-12, 1e-12, false));
        }
        for (var, saved) in trainer
            .gan
            .disc_vs
            .trainable_variables()
            .iter()
            .zip(&grads_before)
        {
            assert!(var.grad().allclose(saved, 1e-12, 1e-12, false));
        }
        // And the freeze was undone.
        assert!(trainer.gan.disc_vs.trainable_variables()[0].requires_grad());
    }

    #[test]
    fn test_generator_step_changes_generator() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(small_config(dir.path())).unwrap();

        let disc = trainer.discriminator_step(&real_batch()).unwrap();
        let before: Vec<Tensor> = trainer
            .gan
            .gen_vs
            .trainable_variables()
            .iter()
            .map(|v| v.copy())
            .collect();

        trainer.generator_step(&disc.noise, &disc.real_logits).unwrap();

        let changed = trainer
            .gan
            .gen_vs
            .trainable_variables()
            .iter()
            .zip(&before)
            .any(|(var, saved)| !var.allclose(saved, 1e-12, 1e-12, false));
        assert!(changed);
    }

    #[test]
    fn test_discriminator_scores_unaugmented_fakes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.ada.enabled = true;
        let mut trainer = Trainer::new(config).unwrap();
        // Force heavy augmentation so any fake that went through the
        // pipeline would produce different logits.
        trainer.ada.as_mut().unwrap().restore(0.8, 0.9);
        let real = real_batch();

        // Replay the step's random draws by hand: noise, then the real-view
        // augmentation. The fakes themselves draw nothing further, so their
        // accuracy must come from the raw generator output.
        tch::manual_seed(7);
        let expected_fake_acc = tch::no_grad(|| {
            let noise = Tensor::randn(
                [4, trainer.gan.latent_dim()],
                (Kind::Float, Device::Cpu),
            );
            let fake = trainer.gan.generator.forward_t(&noise, true);
            let _real_view = trainer.ada.as_ref().unwrap().apply(&real);
            trainer
                .gan
                .discriminator
                .forward_t(&fake, true)
                .tanh()
                .lt(0.0)
                .to_kind(Kind::Float)
                .mean(Kind::Float)
                .double_value(&[])
        });

        tch::manual_seed(7);
        let outcome = trainer.discriminator_step(&real).unwrap();
        assert!((outcome.fake_acc - expected_fake_acc).abs() < 1e-9);
    }

    #[test]
    fn test_train_step_with_r1_penalty() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.loss.penalty = "r1".to_string();
        let mut trainer = Trainer::new(config).unwrap();
        let step = trainer.train_step(&real_batch()).unwrap();
        assert!(step.disc_loss.is_finite());
    }

    #[test]
    fn test_train_step_with_wgan_gp() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.loss.criterion = "wgan_gp".to_string();
        config.loss.penalty = "wgan_gp".to_string();
        let mut trainer = Trainer::new(config).unwrap();
        let step = trainer.train_step(&real_batch()).unwrap();
        assert!(step.disc_loss.is_finite());
        assert!(step.gen_loss.is_finite());
    }

    #[test]
    fn test_write_samples_creates_file_and_restores_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(small_config(dir.path())).unwrap();
        std::fs::create_dir_all(dir.path().join("samples")).unwrap();
        trainer.gan.train();
        trainer.write_samples(3).unwrap();
        assert!(dir.path().join("samples/epoch_0003.png").exists());
        assert!(trainer.gan.is_training());
    }

    #[test]
    fn test_full_epoch_smoke() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.training.sample_every = 1;
        config.training.save_every = 1;
        let mut trainer = Trainer::new(config).unwrap();

        let data = ndarray::Array4::<f32>::zeros((8, 3, 8, 8));
        let mut loader = DataLoader::new(data, 4, false, true).unwrap();
        let metrics = trainer.train(&mut loader).unwrap();
        assert_eq!(metrics.num_epochs(), 1);
    }
}
