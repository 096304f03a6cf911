pub mod backend;
pub mod data;
pub mod model;
pub mod training;

// Re-exports for convenience
pub use data::{load_data, ClassifierDataLoader, DataRequest, ImageDataset, Split};
pub use model::{get_model, ModelKind, TaskNet};
pub use training::{evaluate, run, train, Trainer, TrainingConfig, TrainingReport};
