//! Loading the precomputed system matrix and reducing it to the detector
//! elements which actually see the image.

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use tracing::{info, warn};

use crate::config::MatrixShape;
use crate::error::{ReconError, Result};

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Read the headerless little-endian f32 matrix file at `path`.
///
/// Returns the full `(rows, cols)` matrix, zero rows included.
pub fn load_system_matrix(path: &Path, shape: MatrixShape) -> Result<Array2<f32>> {
    let bytes = fs::read(path).map_err(|e| ReconError::io(path, e))?;
    let matrix = decode_system_matrix(&bytes, shape, path)?;
    info!("{:>28}: {:?}", "Read-in system matrix shape", matrix.dim());
    Ok(matrix)
}

/// Interpret `bytes` as the row-major matrix described by `shape`. `origin`
/// only labels errors.
pub fn decode_system_matrix(bytes: &[u8], shape: MatrixShape, origin: &Path) -> Result<Array2<f32>> {
    let expected = shape
        .checked_len()
        .and_then(|n| n.checked_mul(F32_BYTES))
        .ok_or_else(|| ReconError::format(origin, format!("matrix shape {shape:?} is too large")))?;

    if bytes.len() < expected {
        return Err(ReconError::Truncated { path: origin.to_path_buf(), expected, found: bytes.len() });
    }
    if bytes.len() % F32_BYTES != 0 {
        return Err(ReconError::format(
            origin,
            format!("{} bytes is not a whole number of f32 values", bytes.len()),
        ));
    }
    if bytes.len() > expected {
        warn!("{:?}: ignoring {} bytes after the expected {expected}", origin, bytes.len() - expected);
    }

    let data: Vec<f32> = bytes[..expected]
        .chunks_exact(F32_BYTES)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let negative = data.iter().filter(|&&v| v < 0.0).count();
    if negative > 0 {
        warn!("{:?}: {negative} negative system matrix entries", origin);
    }

    Ok(Array2::from_shape_vec((shape.rows(), shape.cols()), data)?)
}

/// Drop every row whose entries are all exactly zero, keeping the remaining
/// rows in their original order.
pub fn prune_zero_rows(matrix: ArrayView2<f32>) -> Array2<f32> {
    let kept: Vec<usize> = matrix
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().any(|&v| v != 0.0))
        .map(|(i, _)| i)
        .collect();
    let reduced = matrix.select(Axis(0), &kept);
    info!("{:>28}: {:?}", "Reduced system matrix shape", reduced.dim());
    reduced
}

/// Per-pixel sensitivity: the sum of each column, accumulated row by row.
pub fn column_sums(matrix: ArrayView2<f32>) -> Array1<f32> {
    matrix.sum_axis(Axis(0))
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn shape(rows: usize, cols: usize) -> MatrixShape {
        MatrixShape { n_det_x: rows, n_module: 1, n_det_y: 1, n_img_x: cols, n_img_y: 1 }
    }

    fn to_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_row_major() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = decode_system_matrix(&to_bytes(&values), shape(2, 3), Path::new("m")).unwrap();
        assert_eq!(m, array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }

    #[test]
    fn five_dimensional_layout_collapses_detector_axes() {
        let shape = MatrixShape { n_det_x: 2, n_module: 3, n_det_y: 4, n_img_x: 2, n_img_y: 5 };
        let values: Vec<f32> = (0..shape.checked_len().unwrap()).map(|i| i as f32).collect();
        let m = decode_system_matrix(&to_bytes(&values), shape, Path::new("m")).unwrap();
        assert_eq!(m.dim(), (24, 10));
        // Element [det_x=1, module=2, det_y=3, img_x=1, img_y=4]
        let row = (1 * 3 + 2) * 4 + 3;
        let col = 1 * 5 + 4;
        assert_eq!(m[[row, col]], (row * 10 + col) as f32);
    }

    #[test]
    fn short_file_is_truncated() {
        let err = decode_system_matrix(&to_bytes(&[1.0; 5]), shape(2, 3), Path::new("m")).unwrap_err();
        assert!(matches!(err, ReconError::Truncated { expected: 24, found: 20, .. }), "{err}");
    }

    #[test]
    fn short_file_cut_mid_value_is_truncated() {
        let err = decode_system_matrix(&[0u8; 22], shape(2, 3), Path::new("m")).unwrap_err();
        assert!(matches!(err, ReconError::Truncated { expected: 24, found: 22, .. }), "{err}");
    }

    #[test]
    fn partial_value_is_a_format_error() {
        let mut bytes = to_bytes(&[1.0; 6]);
        bytes.push(0);
        let err = decode_system_matrix(&bytes, shape(2, 3), Path::new("m")).unwrap_err();
        assert!(matches!(err, ReconError::Format { .. }), "{err}");
    }

    #[test]
    fn trailing_values_are_ignored() {
        let m = decode_system_matrix(&to_bytes(&[1.0, 2.0, 3.0, 4.0, 9.0]), shape(2, 2), Path::new("m")).unwrap();
        assert_eq!(m, array![[1.0f32, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn missing_file_is_io_error() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sysmatMatrix.sysmat");
        let err = load_system_matrix(&path, shape(1, 1)).unwrap_err();
        assert!(matches!(err, ReconError::Io { .. }));
        assert!(err.to_string().contains("sysmatMatrix.sysmat"));
        Ok(())
    }

    #[test]
    fn loads_from_disk() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sysmatMatrix.sysmat");
        fs::write(&path, to_bytes(&[0.5, 0.0, 0.0, 0.25]))?;
        let m = load_system_matrix(&path, shape(2, 2))?;
        assert_eq!(m, array![[0.5f32, 0.0], [0.0, 0.25]]);
        Ok(())
    }

    #[test]
    fn prunes_only_all_zero_rows() {
        let m = array![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 2.0],
            [0.0, 0.0, 0.0],
        ];
        assert_eq!(prune_zero_rows(m.view()), array![[1.0f32, 0.0, 0.0], [0.0, 0.0, 2.0]]);
    }

    #[test]
    fn pruning_everything_leaves_no_rows() {
        let m = Array2::<f32>::zeros((3, 4));
        assert_eq!(prune_zero_rows(m.view()).dim(), (0, 4));
    }

    #[test]
    fn column_sums_add_rows() {
        let m = array![[1.0, 1.0, 0.0, 0.0], [0.0, 1.0, 1.0, 1.0]];
        assert_eq!(column_sums(m.view()), array![1.0f32, 2.0, 1.0, 1.0]);
    }

    fn sparse_matrix() -> impl Strategy<Value = Array2<f32>> {
        (1usize..8, 1usize..6).prop_flat_map(|(rows, cols)| {
            prop::collection::vec(prop_oneof![3 => Just(0.0f32), 1 => 0.0f32..10.0], rows * cols)
                .prop_map(move |v| Array2::from_shape_vec((rows, cols), v).unwrap())
        })
    }

    proptest! {
        #[test]
        fn pruned_rows_are_exactly_the_nonzero_rows(m in sparse_matrix()) {
            let expected: Vec<Vec<f32>> = m
                .outer_iter()
                .filter(|row| row.iter().any(|&v| v != 0.0))
                .map(|row| row.to_vec())
                .collect();
            let reduced = prune_zero_rows(m.view());
            let got: Vec<Vec<f32>> = reduced.outer_iter().map(|row| row.to_vec()).collect();
            prop_assert_eq!(got, expected);
            prop_assert_eq!(reduced.ncols(), m.ncols());
        }
    }
}
