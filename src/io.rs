//! Phantom input and snapshot output as `.npz` array archives.

use std::fs::{self, File};
use std::path::Path;

use ndarray::{Array1, ArrayD, ArrayView2, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpzError, WriteNpzError};
use tracing::info;

use crate::error::{ReconError, Result};

/// Name of the single array in the output archive, as `numpy.savez` names
/// positional arrays.
pub const OUTPUT_ARRAY_NAME: &str = "arr_0";

/// Read the first array in the archive at `path` as a flattened image of
/// `n_pixels` values. Both f32 and f64 archives are accepted.
pub fn read_phantom(path: &Path, n_pixels: usize) -> Result<Array1<f32>> {
    let npz_err = |source: ReadNpzError| ReconError::NpzRead { path: path.to_path_buf(), source };

    let file = File::open(path).map_err(|e| ReconError::io(path, e))?;
    let mut npz = NpzReader::new(file).map_err(npz_err)?;
    if npz.is_empty() {
        return Err(ReconError::format(path, "archive holds no arrays"));
    }

    let phantom: Array1<f32> = match npz.by_index::<OwnedRepr<f32>, IxDyn>(0) {
        Ok(a) => a.iter().copied().collect(),
        Err(as_f32) => {
            // numpy writes f64 unless told otherwise
            let a: ArrayD<f64> = npz.by_index(0).map_err(|_| npz_err(as_f32))?;
            a.iter().map(|&v| v as f32).collect()
        }
    };

    if phantom.len() != n_pixels {
        return Err(ReconError::format(
            path,
            format!("phantom has {} values, expected {n_pixels}", phantom.len()),
        ));
    }
    Ok(phantom)
}

/// Write `snapshots` to `path` as a single-entry, uncompressed archive,
/// creating the parent directory if needed.
pub fn write_snapshots(path: &Path, snapshots: ArrayView2<f32>) -> Result<()> {
    let npz_err = |source: WriteNpzError| ReconError::NpzWrite { path: path.to_path_buf(), source };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| ReconError::io(dir, e))?;
    }
    let file = File::create(path).map_err(|e| ReconError::io(path, e))?;
    let mut npz = NpzWriter::new(file);
    npz.add_array(OUTPUT_ARRAY_NAME, &snapshots).map_err(npz_err)?;
    npz.finish().map_err(npz_err)?;
    info!("Reconstruction snapshots {:?} written to {:?}", snapshots.dim(), path);
    Ok(())
}
