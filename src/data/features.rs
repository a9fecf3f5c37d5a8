//! Precomputed image feature maps.
//!
//! Each image is stored as an `.npy` array of `f32` with shape `[channels, height, width]`
//! (the last convolutional map of an image backbone). The attention layers address
//! individual spatial locations, so the grid is flattened into `height * width` region
//! vectors of size `channels`.

use crate::constants::{IMAGE_CHANNELS, IMAGE_GRID};
use crate::error::DataError;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};
use ndarray_npy::ReadNpyExt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Shape of a stored feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeatureShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl Default for FeatureShape {
    fn default() -> Self {
        Self {
            channels: IMAGE_CHANNELS,
            height: IMAGE_GRID,
            width: IMAGE_GRID,
        }
    }
}

impl FeatureShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    pub fn regions(&self) -> usize {
        self.height * self.width
    }

    /// Number of values of a single feature map.
    pub fn len(&self) -> usize {
        self.channels * self.regions()
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

/// Reads a `[channels, height, width]` feature map, checking its shape.
pub fn load_feature_map(path: &Path, shape: FeatureShape) -> Result<Array3<f32>, DataError> {
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })?;
    let grid = Array3::<f32>::read_npy(file).map_err(|source| DataError::Npy {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })?;
    if grid.shape() != &shape.dims()[..] {
        return Err(DataError::FeatureShape {
            path: path.to_path_buf(),
            found: grid.shape().to_vec(),
            expected: shape.dims(),
        });
    }
    Ok(grid)
}

/// Flattens the spatial dims and moves the channels last.
///
/// # Shapes
///   - Input [channels, height, width]
///   - Output [height * width, channels]
pub fn grid_to_regions(grid: ArrayView3<f32>) -> Result<Array2<f32>, DataError> {
    let (channels, height, width) = grid.dim();
    let regions = grid
        .permuted_axes([1, 2, 0])
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((height * width, channels))?;
    Ok(regions)
}

/// Inverse of [`grid_to_regions`].
///
/// # Shapes
///   - Input [height * width, channels]
///   - Output [channels, height, width]
pub fn regions_to_grid(
    regions: ArrayView2<f32>,
    height: usize,
    width: usize,
) -> Result<Array3<f32>, DataError> {
    let (_regions, channels) = regions.dim();
    let grid = regions
        .reversed_axes()
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((channels, height, width))?;
    Ok(grid)
}

/// Reads a pretrained embedding matrix of shape `[vocab_size, embedding_dim]`.
pub fn load_embedding_matrix(path: &Path) -> Result<Array2<f32>, DataError> {
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })?;
    Array2::<f32>::read_npy(file).map_err(|source| DataError::Npy {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_npy::WriteNpyExt;

    fn counting_grid(shape: FeatureShape) -> Array3<f32> {
        Array3::from_shape_fn((shape.channels, shape.height, shape.width), |(c, h, w)| {
            (c * 1000 + h * 10 + w) as f32
        })
    }

    #[test]
    fn regions_are_channel_last() {
        let shape = FeatureShape::new(3, 2, 2);
        let grid = counting_grid(shape);
        let regions = grid_to_regions(grid.view()).unwrap();
        assert_eq!(regions.dim(), (4, 3));
        // region 3 is (h=1, w=1)
        assert_eq!(regions.row(3).to_vec(), vec![11., 1011., 2011.]);
        assert_eq!(regions.row(1).to_vec(), vec![1., 1001., 2001.]);
    }

    #[test]
    fn full_size_reshape_round_trips() {
        let shape = FeatureShape::default();
        let grid = counting_grid(shape);
        let regions = grid_to_regions(grid.view()).unwrap();
        assert_eq!(regions.dim(), (196, 512));
        let back = regions_to_grid(regions.view(), shape.height, shape.width).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn regions_must_fill_the_grid() {
        let regions = Array2::<f32>::zeros((5, 2));
        let err = regions_to_grid(regions.view(), 2, 2).unwrap_err();
        assert!(matches!(err, DataError::Reshape(_)));
    }

    #[test]
    fn rejects_mismatched_feature_maps() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.child("img.npy");
        let grid = Array3::<f32>::zeros((4, 3, 3));
        grid.write_npy(File::create(&path).unwrap()).unwrap();

        let loaded = load_feature_map(&path, FeatureShape::new(4, 3, 3)).unwrap();
        assert_eq!(loaded.dim(), (4, 3, 3));

        let err = load_feature_map(&path, FeatureShape::new(4, 2, 2)).unwrap_err();
        assert!(matches!(err, DataError::FeatureShape { .. }));

        let err = load_feature_map(&dir.child("missing.npy"), FeatureShape::new(4, 3, 3))
            .unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }
}
