//! Backend type aliases and device management
//!
//! - **TrainingBackend**: Autodiff-enabled NdArray backend (CPU)
//! - **InferenceBackend**: Plain NdArray backend used for rollouts and evaluation
//!
//! The grid is tiny and the networks are small MLPs, so the CPU backend is
//! enough for full experiments.

use burn::backend::{
    Autodiff,
    ndarray::{NdArray, NdArrayDevice},
};

/// Backend type for training (with autodiff)
pub type TrainingBackend = Autodiff<NdArray<f32>>;

/// Backend type for gradient-free rollouts
pub type InferenceBackend = NdArray<f32>;

/// Device shared by both backends
pub type Device = NdArrayDevice;

/// Get the default device for computation
pub fn default_device() -> Device {
    NdArrayDevice::default()
}
