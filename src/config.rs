//! Reconstruction parameters, read once from the JSON file shared with the
//! system-matrix generator.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de, Deserialize, Deserializer};

use crate::error::{ReconError, Result};

/// File name of the system matrix inside `sysmatPath`.
pub const SYSMAT_FILE_NAME: &str = "sysmatMatrix.sysmat";

/// Phantom archives, selected by the `AddPoisson` flag.
pub const PHANTOM_FILE_NAME: &str = "circle-phantom.npz";
pub const NOISY_PHANTOM_FILE_NAME: &str = "circle-phantom_noise.npz";

/// The subset of `Parameters.json` needed for reconstruction.
///
/// Keys not listed here are ignored: the same file also drives the
/// generator which produced the system matrix.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Parameters {
    #[serde(rename = "numImageX")]
    pub num_image_x: usize,

    #[serde(rename = "numImageY")]
    pub num_image_y: usize,

    /// Detector pixels per module
    #[serde(rename = "pixelSiPM")]
    pub pixel_sipm: usize,

    #[serde(rename = "numPanel")]
    pub num_panel: usize,

    #[serde(rename = "numDetectorLayer")]
    pub num_detector_layer: usize,

    #[serde(rename = "sysmatPath")]
    pub sysmat_path: PathBuf,

    /// Reconstruct the phantom with Poisson noise added
    #[serde(rename = "AddPoisson", deserialize_with = "deserialize_flag")]
    pub add_poisson: bool,

    #[serde(rename = "ReconstructionIterations")]
    pub reconstruction_iterations: usize,
}

// The generator writes this flag either as a JSON bool or as 0/1.
fn deserialize_flag<'d, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'d>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(n) => Err(de::Error::custom(format!("expected boolean flag, found {n}"))),
    }
}

impl Parameters {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ReconError::io(path, e))?;
        Self::from_json_str(&text, path)
    }

    /// Parse and validate; `origin` only labels errors.
    pub fn from_json_str(text: &str, origin: &Path) -> Result<Self> {
        let parameters: Self = serde_json::from_str(text)
            .map_err(|source| ReconError::Json { path: origin.to_path_buf(), source })?;
        parameters.validate(origin)?;
        Ok(parameters)
    }

    fn validate(&self, origin: &Path) -> Result<()> {
        let dimensions = [
            ("numImageX", self.num_image_x),
            ("numImageY", self.num_image_y),
            ("pixelSiPM", self.pixel_sipm),
            ("numPanel", self.num_panel),
            ("numDetectorLayer", self.num_detector_layer),
        ];
        for (name, value) in dimensions {
            if value == 0 {
                return Err(ReconError::Config {
                    path: origin.to_path_buf(),
                    reason: format!("{name} must be positive"),
                });
            }
        }
        self.matrix_shape().checked_len().ok_or_else(|| ReconError::Config {
            path: origin.to_path_buf(),
            reason: "system matrix size overflows usize".into(),
        })?;
        Ok(())
    }

    pub fn matrix_shape(&self) -> MatrixShape {
        MatrixShape {
            n_det_x: self.num_detector_layer,
            n_module: self.num_panel,
            n_det_y: self.pixel_sipm,
            n_img_x: self.num_image_x,
            n_img_y: self.num_image_y,
        }
    }

    pub fn sysmat_file(&self) -> PathBuf {
        self.sysmat_path.join(SYSMAT_FILE_NAME)
    }

    pub fn phantom_file(&self, dir: &Path) -> PathBuf {
        if self.add_poisson {
            dir.join(NOISY_PHANTOM_FILE_NAME)
        } else {
            dir.join(PHANTOM_FILE_NAME)
        }
    }
}

/// Five-dimensional layout `(n_det_x, n_module, n_det_y, n_img_x, n_img_y)`
/// of the system matrix file, viewed as a 2D `(rows, cols)` matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixShape {
    pub n_det_x: usize,
    pub n_module: usize,
    pub n_det_y: usize,
    pub n_img_x: usize,
    pub n_img_y: usize,
}

impl MatrixShape {
    /// Detector response elements
    pub fn rows(&self) -> usize {
        self.n_det_x * self.n_module * self.n_det_y
    }

    /// Image pixels
    pub fn cols(&self) -> usize {
        self.n_img_x * self.n_img_y
    }

    pub fn checked_len(&self) -> Option<usize> {
        [self.n_det_x, self.n_module, self.n_det_y, self.n_img_x, self.n_img_y]
            .into_iter()
            .try_fold(1usize, |acc, n| acc.checked_mul(n))
    }
}
