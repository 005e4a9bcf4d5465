//! Backend selection.
//!
//! The pipeline runs on burn's portable ndarray CPU backend; training wraps
//! it in `Autodiff`.

use burn::backend::{Autodiff, NdArray};

/// Backend used for inference, evaluation and conversion
pub type DefaultBackend = NdArray<f32>;

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    Default::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    "NdArray (CPU)"
}
