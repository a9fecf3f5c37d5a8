//! Backend the binary trains and predicts on: `ndarray` on the cpu by default, `wgpu` when
//! its feature is enabled (it takes precedence over `ndarray`).

use burn::prelude::*;

pub type Element = f32;

#[cfg(feature = "wgpu")]
pub type InferenceBackend = burn::backend::wgpu::Wgpu<Element, i32>;
#[cfg(all(feature = "ndarray", not(feature = "wgpu")))]
pub type InferenceBackend = burn::backend::NdArray<Element, i32>;

#[cfg(not(any(feature = "ndarray", feature = "wgpu")))]
std::compile_error!("No backend selected. Enable the `ndarray` or the `wgpu` feature of san-vqa.");

pub type TrainingBackend = burn::backend::Autodiff<InferenceBackend>;

/// Device of both backends. `Autodiff` shares the device type of the backend it wraps.
pub fn main_device() -> <InferenceBackend as Backend>::Device {
    Default::default()
}
