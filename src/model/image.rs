use crate::constants::IMAGE_CHANNELS;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

/// Projects each image region into the question embedding space.
#[derive(Module, Debug)]
pub struct ImageEncoder<B: Backend> {
    /// Input channel: channels.
    /// Output channel: embed_dim.
    pub proj: Linear<B>,
}

#[derive(Config, Debug)]
pub struct ImageEncoderConfig {
    /// Channels of the image feature map.
    #[config(default = "IMAGE_CHANNELS")]
    pub channels: usize,
    /// Size of each region embedding, which must match the question embedding.
    pub embed_dim: usize,
}

impl ImageEncoderConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageEncoder<B> {
        ImageEncoder {
            proj: LinearConfig::new(self.channels, self.embed_dim)
                .with_bias(true)
                .init(device),
        }
    }
}

impl<B: Backend> ImageEncoder<B> {
    /// # Shapes
    ///   - Input [batch, regions, channels]
    ///   - Output [batch, regions, embed_dim]
    pub fn forward(&self, images: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, regions, _channels] = images.dims();
        let [_channels, embed_dim] = self.proj.weight.dims();

        let x = self.proj.forward(images).tanh();
        debug_assert_eq!([batch, regions, embed_dim], x.dims());
        x
    }

    /// Same as [`Self::forward`] for feature maps that still have their spatial layout.
    ///
    /// # Shapes
    ///   - Input [batch, channels, height, width]
    ///   - Output [batch, height * width, embed_dim]
    pub fn forward_grid(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        self.forward(grid_to_regions(images))
    }
}

/// Flattens the spatial dims and moves the channels last.
///
/// # Shapes
///   - Input [batch, channels, height, width]
///   - Output [batch, height * width, channels]
pub fn grid_to_regions<B: Backend>(grid: Tensor<B, 4>) -> Tensor<B, 3> {
    let [batch, channels, height, width] = grid.dims();
    grid.reshape([batch, channels, height * width]).swap_dims(1, 2)
}

/// Inverse of [`grid_to_regions`].
///
/// # Shapes
///   - Input [batch, height * width, channels]
///   - Output [batch, channels, height, width]
pub fn regions_to_grid<B: Backend>(
    regions: Tensor<B, 3>,
    height: usize,
    width: usize,
) -> Tensor<B, 4> {
    let [batch, n_regions, channels] = regions.dims();
    assert_eq!(n_regions, height * width);
    regions
        .swap_dims(1, 2)
        .reshape([batch, channels, height, width])
}
