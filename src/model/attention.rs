//! Stacked attention over image regions.
//!
//! Each hop scores every region against the current query,
//! `h_r = tanh(W_v v_r + W_u u + b)` and `s_r = w^T h_r + b_s`, normalizes the scores with a
//! softmax over the regions, and adds the attention-weighted sum of the regions to the query:
//! `u' = u + Σ_r softmax(s)_r v_r`. The regions are encoded once and reused by every hop.

use crate::constants::ATTENTION_DIM;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;

/// A single attention hop.
#[derive(Module, Debug)]
pub struct AttentionLayer<B: Backend> {
    /// Input channel: embed_dim.
    /// Output channel: attention_dim.
    pub region_proj: Linear<B>,

    /// Input channel: embed_dim.
    /// Output channel: attention_dim.
    pub query_proj: Linear<B>,

    /// Input channel: attention_dim.
    /// Output channel: 1.
    pub score: Linear<B>,

    pub dropout: Dropout,
}

#[derive(Config, Debug)]
pub struct AttentionLayerConfig {
    /// Size of the region embeddings and of the query.
    pub embed_dim: usize,
    #[config(default = "ATTENTION_DIM")]
    pub attention_dim: usize,
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl AttentionLayerConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionLayer<B> {
        AttentionLayer {
            region_proj: LinearConfig::new(self.embed_dim, self.attention_dim)
                .with_bias(false)
                .init(device),
            query_proj: LinearConfig::new(self.embed_dim, self.attention_dim)
                .with_bias(true)
                .init(device),
            score: LinearConfig::new(self.attention_dim, 1)
                .with_bias(true)
                .init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Result of an attention hop.
#[derive(Debug, Clone)]
pub struct AttentionOutput<B: Backend> {
    /// The refined query.
    ///
    /// # Shape
    /// [batch, embed_dim]
    pub query: Tensor<B, 2>,
    /// Attention weights, summing to one over the regions.
    ///
    /// # Shape
    /// [batch, regions]
    pub weights: Tensor<B, 2>,
}

impl<B: Backend> AttentionLayer<B> {
    /// # Shapes
    ///   - Input regions [batch, regions, embed_dim]
    ///   - Input query [batch, embed_dim]
    ///   - Output.query [batch, embed_dim]
    ///   - Output.weights [batch, regions]
    pub fn forward(&self, regions: Tensor<B, 3>, query: Tensor<B, 2>) -> AttentionOutput<B> {
        let [batch, n_regions, embed_dim] = regions.dims();
        let [_embed_dim, attention_dim] = self.region_proj.weight.dims();
        assert_eq!([batch, embed_dim], query.dims());

        let hr = self.region_proj.forward(regions.clone());
        debug_assert_eq!([batch, n_regions, attention_dim], hr.dims());
        let hq = self.query_proj.forward(query.clone()).unsqueeze_dim::<3>(1);
        debug_assert_eq!([batch, 1, attention_dim], hq.dims());

        // the query is broadcast over the regions
        let h = (hr + hq).tanh();
        let h = self.dropout.forward(h);

        let scores = self.score.forward(h).reshape([batch, n_regions]);
        let weights = softmax(scores, 1);
        debug_assert_eq!([batch, n_regions], weights.dims());

        let attended = weights
            .clone()
            .unsqueeze_dim::<3>(1)
            .matmul(regions)
            .reshape([batch, embed_dim]);

        AttentionOutput {
            query: query + attended,
            weights,
        }
    }
}

/// `hops` attention layers applied one after the other, each with its own weights.
#[derive(Module, Debug)]
pub struct AttentionStack<B: Backend> {
    /// # Shape
    /// [hops]
    pub layers: Vec<AttentionLayer<B>>,
}

#[derive(Config, Debug)]
pub struct AttentionStackConfig {
    #[config(default = 2)]
    pub hops: usize,
    pub layer: AttentionLayerConfig,
}

impl AttentionStackConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionStack<B> {
        assert!(self.hops > 0, "at least one attention hop is required");
        AttentionStack {
            layers: (0..self.hops).map(|_| self.layer.init(device)).collect(),
        }
    }
}

impl<B: Backend> AttentionStack<B> {
    pub fn hops(&self) -> usize {
        self.layers.len()
    }

    /// Refines the query through every hop.
    ///
    /// # Shapes
    ///   - Input regions [batch, regions, embed_dim]
    ///   - Input query [batch, embed_dim]
    ///   - Output.0 [batch, embed_dim]
    ///   - Output.1 [hops] x [batch, regions]
    pub fn forward(
        &self,
        regions: Tensor<B, 3>,
        query: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Vec<Tensor<B, 2>>) {
        let mut query = query;
        let mut weights = Vec::with_capacity(self.hops());
        for layer in &self.layers {
            let output = layer.forward(regions.clone(), query);
            query = output.query;
            weights.push(output.weights);
        }
        (query, weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_REGIONS;
    use crate::utils::max_abs_diff;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    fn layer(embed_dim: usize) -> AttentionLayer<TestBackend> {
        AttentionLayerConfig::new(embed_dim)
            .with_attention_dim(16)
            .init(&Default::default())
    }

    #[test]
    fn weights_sum_to_one() {
        let device = Default::default();
        let layer = layer(12);
        let regions =
            Tensor::<TestBackend, 3>::random([3, NUM_REGIONS, 12], Distribution::Default, &device);
        for _ in 0..4 {
            let query =
                Tensor::<TestBackend, 2>::random([3, 12], Distribution::Normal(0., 3.), &device);
            let output = layer.forward(regions.clone(), query);
            assert_eq!([3, NUM_REGIONS], output.weights.dims());
            let sums = output.weights.sum_dim(1);
            assert!(max_abs_diff(sums, Tensor::ones([3, 1], &device)) < 1e-5);
        }
    }

    #[test]
    fn uniform_regions_get_uniform_weights() {
        let device = Default::default();
        let layer = layer(4);
        let region = Tensor::<TestBackend, 1>::from_floats([0.5, -1., 2., 0.], &device);
        let regions = region.reshape([1, 1, 4]).repeat_dim(1, NUM_REGIONS);
        let query = Tensor::<TestBackend, 2>::from_floats([[1., 2., 3., 4.]], &device);

        let output = layer.forward(regions.clone(), query.clone());
        let uniform = Tensor::full([1, NUM_REGIONS], 1. / NUM_REGIONS as f32, &device);
        assert!(max_abs_diff(output.weights, uniform) < 1e-6);

        // the attended vector is the mean of the regions, added to the query
        let mean = regions.mean_dim(1).reshape([1, 4]);
        assert!(max_abs_diff(output.query, query + mean) < 1e-5);
    }

    #[test]
    fn region_order_does_not_change_the_output() {
        let device = Default::default();
        let layer = layer(6);
        let regions = Tensor::<TestBackend, 3>::random([2, 5, 6], Distribution::Default, &device);
        let query = Tensor::<TestBackend, 2>::random([2, 6], Distribution::Default, &device);

        let order = Tensor::<TestBackend, 1, Int>::from_ints([3, 0, 4, 1, 2], &device);
        let permuted = regions.clone().select(1, order.clone());

        let a = layer.forward(regions, query.clone());
        let b = layer.forward(permuted, query);
        assert!(max_abs_diff(b.query, a.query) < 1e-5);
        assert!(max_abs_diff(b.weights, a.weights.select(1, order)) < 1e-6);
    }

    #[test]
    fn stack_feeds_each_hop_the_previous_query() {
        let device = Default::default();
        let stack = AttentionStackConfig::new(AttentionLayerConfig::new(8).with_attention_dim(4))
            .with_hops(3)
            .init::<TestBackend>(&device);
        let regions = Tensor::<TestBackend, 3>::random([2, 9, 8], Distribution::Default, &device);
        let query = Tensor::<TestBackend, 2>::random([2, 8], Distribution::Default, &device);

        let (refined, weights) = stack.forward(regions.clone(), query.clone());
        assert_eq!(weights.len(), 3);
        assert_eq!([2, 8], refined.dims());

        let mut expected = query;
        for layer in &stack.layers {
            expected = layer.forward(regions.clone(), expected).query;
        }
        assert!(max_abs_diff(refined, expected) < 1e-6);
    }
}
