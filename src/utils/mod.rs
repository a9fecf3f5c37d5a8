use burn::prelude::*;
use burn::tensor::ElementConversion;

/// Largest element-wise absolute difference between two tensors of the same shape.
pub fn max_abs_diff<B: Backend, const D: usize>(a: Tensor<B, D>, b: Tensor<B, D>) -> f32 {
    assert_eq!(a.dims(), b.dims());
    (a - b).abs().max().into_scalar().elem()
}

/// Reads a single-element tensor.
pub fn scalar<B: Backend, const D: usize>(t: Tensor<B, D>) -> f64 {
    debug_assert_eq!(t.dims().iter().product::<usize>(), 1);
    t.into_scalar().elem()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn measures_the_largest_difference() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 2>::from_floats([[1., 2.], [3., 4.]], &device);
        let b = Tensor::<TestBackend, 2>::from_floats([[1., 2.5], [2., 4.]], &device);
        assert_eq!(max_abs_diff(a, b), 1.0);
    }
}
