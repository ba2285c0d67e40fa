//! Adversarial training: losses, penalties, augmentation and the loop itself

pub mod ada;
pub mod losses;
pub mod metrics;
pub mod penalty;
pub mod scaler;
pub mod scheduler;
pub mod trainer;

pub use ada::AdaController;
pub use losses::{build_loss, GanLoss, LossKind};
pub use metrics::{EpochMetrics, EpochTracker, TrainingMetrics};
pub use penalty::{GradientPenalty, PenaltyKind};
pub use scaler::GradScaler;
pub use scheduler::LrSchedule;
pub use trainer::{StepMetrics, Trainer};
