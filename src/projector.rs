//! Forward and backward projection through a dense system matrix.
//!
//! Both products go through `ndarray`'s `dot`, whose summation order is fixed
//! for a given shape and memory layout, so repeated runs on the same input
//! reproduce the same iteration sequence bit for bit.

use ndarray::{Array1, ArrayView1, ArrayView2};

/// Expected detector response of `image`: `matrix · image`.
///
/// matrix: shape (R, C)
/// image:  length C
pub fn forward_project(matrix: ArrayView2<f32>, image: ArrayView1<f32>) -> Array1<f32> {
    assert_eq!(matrix.ncols(), image.len(), "image length must match matrix columns");
    matrix.dot(&image)
}

/// Distribute a detector-space vector back into image space: `values · matrix`.
///
/// values: length R
/// matrix: shape (R, C)
pub fn back_project(values: ArrayView1<f32>, matrix: ArrayView2<f32>) -> Array1<f32> {
    assert_eq!(matrix.nrows(), values.len(), "projection length must match matrix rows");
    values.dot(&matrix)
}
