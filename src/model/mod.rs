pub mod blocks;
pub mod loss;
pub mod net;
pub mod zoo;

use anyhow::{ensure, Result};
use burn::prelude::*;

pub use loss::ClassificationLoss;
pub use net::{meta_path, ModelMeta, TaskNet};
pub use zoo::{ModelKind, NetLayout};

/// Builds the classifier registered under `name` with `num_cls` outputs.
pub fn get_model<B: Backend>(name: &str, num_cls: usize, device: &B::Device) -> Result<TaskNet<B>> {
    let kind: ModelKind = name.parse()?;
    ensure!(num_cls > 0, "{} needs at least one class", kind);
    Ok(TaskNet::new(device, kind, num_cls))
}
