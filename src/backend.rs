//! Backend selection: ndarray on the CPU by default, wgpu with the `wgpu` feature.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(not(feature = "wgpu"))]
pub type InferenceBackend = burn::backend::NdArray;

#[cfg(feature = "wgpu")]
pub type InferenceBackend = burn::backend::Wgpu;

pub type TrainingBackend = Autodiff<InferenceBackend>;

pub type Device = <InferenceBackend as Backend>::Device;

/// Whether tensors live on an accelerator rather than host memory.
pub fn accelerator_available() -> bool {
    cfg!(feature = "wgpu")
}

pub fn default_device() -> Device {
    Device::default()
}
