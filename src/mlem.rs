//! Maximum-Likelihood Expectation-Maximization reconstruction.

use std::num::NonZeroUsize;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use tracing::{debug, info, warn, Level};

use crate::projector::{back_project, forward_project};
use crate::system_matrix::column_sums;

/// One ML-EM update of `estimate` against the `observed` projection.
///
/// estimate:    length C (current image)
/// observed:    length R (measured projection)
/// matrix:      shape (R, C)
/// column_sums: length C, the column sums of `matrix`
///
/// No guard is applied against zero forward projections or zero column sums:
/// the resulting inf/nan propagate into the returned image.
pub fn mlem_step(
    estimate: ArrayView1<f32>,
    observed: ArrayView1<f32>,
    matrix: ArrayView2<f32>,
    column_sums: ArrayView1<f32>,
) -> Array1<f32> {
    let (m, n) = matrix.dim();
    assert_eq!(observed.len(), m);
    assert_eq!(estimate.len(), n);
    assert_eq!(column_sums.len(), n);

    // expected projection under the current estimate
    let forward = forward_project(matrix, estimate);
    let ratio = Zip::from(&observed).and(&forward).map_collect(|&y, &f| y / f);

    let mut next = back_project(ratio.view(), matrix);
    Zip::from(&mut next)
        .and(&column_sums)
        .and(&estimate)
        .for_each(|b, &s, &x| *b = *b / s * x);
    next
}

/// [`mlem_step`] with the column sums recomputed from `matrix`.
pub fn mlem_update(estimate: ArrayView1<f32>, observed: ArrayView1<f32>, matrix: ArrayView2<f32>) -> Array1<f32> {
    let sums = column_sums(matrix);
    mlem_step(estimate, observed, matrix, sums.view())
}

/// Poisson log-likelihood of `observed` counts given `expected` means, up to
/// the constant `-ln(y!)` terms.
pub fn poisson_log_likelihood(observed: ArrayView1<f32>, expected: ArrayView1<f32>) -> f64 {
    observed
        .iter()
        .zip(expected.iter())
        .map(|(&y, &f)| {
            let (y, f) = (f64::from(y), f64::from(f));
            if y == 0.0 { -f } else { y * f.ln() - f }
        })
        .sum()
}

/// Receives `(completed, total)` after every iteration.
pub trait ProgressObserver {
    fn on_progress(&mut self, completed: usize, total: usize);
}

impl<F: FnMut(usize, usize)> ProgressObserver for F {
    fn on_progress(&mut self, completed: usize, total: usize) {
        self(completed, total)
    }
}

/// Discards progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl ProgressObserver for Silent {
    fn on_progress(&mut self, _completed: usize, _total: usize) {}
}

/// Non-finite values observed during a run. Reported, never corrected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalyReport {
    /// Image pixels no detector element is sensitive to
    pub zero_column_sums: usize,
    /// 0-based index of the first iteration whose result held a nan or inf
    pub first_non_finite_iteration: Option<usize>,
    pub non_finite_pixels: usize,
}

impl AnomalyReport {
    pub fn is_clean(&self) -> bool {
        self.zero_column_sums == 0 && self.first_non_finite_iteration.is_none()
    }

    pub fn log(&self) {
        if self.zero_column_sums > 0 {
            warn!("{} image pixels have zero column sum in the system matrix", self.zero_column_sums);
        }
        if let Some(iter) = self.first_non_finite_iteration {
            warn!(
                "estimate became non-finite at iteration {iter}; {} pixels non-finite at the end",
                self.non_finite_pixels
            );
        }
    }
}

/// Output of [`Reconstruction::run`].
#[derive(Debug, Clone)]
pub struct Reconstructed {
    /// shape (ceil(iterations / scale), C)
    pub snapshots: Array2<f32>,
    /// Estimate after the last iteration
    pub estimate: Array1<f32>,
    pub anomalies: AnomalyReport,
}

/// A pruned system matrix together with the fixed projection it is fitted to.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    matrix: Array2<f32>,
    observed: Array1<f32>,
    column_sums: Array1<f32>,
}

impl Reconstruction {
    /// matrix:   shape (R, C), already pruned of zero rows
    /// observed: length R
    pub fn new(matrix: Array2<f32>, observed: Array1<f32>) -> Self {
        assert_eq!(matrix.nrows(), observed.len(), "projection length must match matrix rows");
        let column_sums = column_sums(matrix.view());
        Self { matrix, observed, column_sums }
    }

    /// Use the forward projection of `phantom` as the measured data.
    pub fn from_phantom(matrix: Array2<f32>, phantom: ArrayView1<f32>) -> Self {
        let observed = forward_project(matrix.view(), phantom);
        info!("{:>28}: {:?}", "Projection shape", observed.dim());
        Self::new(matrix, observed)
    }

    pub fn matrix(&self) -> ArrayView2<f32> {
        self.matrix.view()
    }

    pub fn observed(&self) -> ArrayView1<f32> {
        self.observed.view()
    }

    pub fn column_sums(&self) -> ArrayView1<f32> {
        self.column_sums.view()
    }

    pub fn n_pixels(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn step(&self, estimate: ArrayView1<f32>) -> Array1<f32> {
        mlem_step(estimate, self.observed.view(), self.matrix.view(), self.column_sums.view())
    }

    pub fn log_likelihood(&self, estimate: ArrayView1<f32>) -> f64 {
        let expected = forward_project(self.matrix.view(), estimate);
        poisson_log_likelihood(self.observed.view(), expected.view())
    }

    /// Run `n_iterations` updates starting from a flat image of ones.
    ///
    /// The estimate is copied into the snapshot buffer right after the update
    /// of every iteration `iter` with `iter % scale == 0`, at row
    /// `iter / scale`. Row 0 therefore holds the result of the first update,
    /// not the initial image.
    pub fn run(
        &self,
        n_iterations: usize,
        scale: NonZeroUsize,
        progress: &mut impl ProgressObserver,
    ) -> Reconstructed {
        let scale = scale.get();
        let mut estimate = Array1::<f32>::ones(self.n_pixels());
        let mut snapshots = Array2::<f32>::zeros((n_iterations.div_ceil(scale), self.n_pixels()));
        let mut anomalies = AnomalyReport {
            zero_column_sums: self.column_sums.iter().filter(|&&s| s == 0.0).count(),
            ..AnomalyReport::default()
        };

        for iter in 0..n_iterations {
            estimate = self.step(estimate.view());
            progress.on_progress(iter + 1, n_iterations);

            if anomalies.first_non_finite_iteration.is_none() && estimate.iter().any(|v| !v.is_finite()) {
                anomalies.first_non_finite_iteration = Some(iter);
            }
            if iter % scale == 0 {
                snapshots.row_mut(iter / scale).assign(&estimate);
                if tracing::enabled!(Level::DEBUG) {
                    debug!("iteration {iter}: log-likelihood {:.6e}", self.log_likelihood(estimate.view()));
                }
            }
        }

        anomalies.non_finite_pixels = estimate.iter().filter(|v| !v.is_finite()).count();
        Reconstructed { snapshots, estimate, anomalies }
    }
}
