//! ML-EM image reconstruction from a precomputed dense system matrix.
//!
//! - `config`: parameters shared with the system matrix generator
//! - `system_matrix`: binary matrix loading and zero-row pruning
//! - `projector`: forward and backward projection
//! - `mlem`: the ML-EM update and the iteration driver
//! - `io`: phantom input and snapshot output archives

pub mod config;
pub mod error;
pub mod io;
pub mod mlem;
pub mod projector;
pub mod system_matrix;

pub use error::{ReconError, Result};
pub use mlem::{mlem_step, mlem_update, AnomalyReport, ProgressObserver, Reconstructed, Reconstruction};
