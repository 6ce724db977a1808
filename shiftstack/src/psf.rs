//! Point spread function kernels for matched filtering.
//!
//! A [`Psf`] is a square, odd-sided grid of f32 weights. It is attached to
//! each layered image and drives both the ψ-plane convolution (the kernel
//! itself) and the φ-plane convolution (the element-wise square of the
//! kernel). Kernels are immutable once constructed.

use ndarray::Array2;

use crate::error::SearchError;

/// A square, odd-sided point spread function kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Psf {
    kernel: Array2<f32>,
    sum: f32,
}

impl Psf {
    /// Discretize an isotropic 2D Gaussian with the given standard
    /// deviation onto a square grid.
    ///
    /// The grid radius is `ceil(3σ)` (at least 1), so the kernel covers
    /// ≥ 3σ in every direction, and the discrete weights are normalized
    /// to sum to 1.
    ///
    /// # Arguments
    /// * `sigma` - Standard deviation in pixels (must be > 0)
    pub fn gaussian(sigma: f32) -> Self {
        assert!(sigma > 0.0, "PSF sigma must be positive, got {sigma}");

        let radius = (3.0 * sigma).ceil().max(1.0) as usize;
        let dim = 2 * radius + 1;

        let mut kernel = Array2::zeros((dim, dim));
        let mut sum = 0.0f32;
        for row in 0..dim {
            for col in 0..dim {
                let dy = row as f32 - radius as f32;
                let dx = col as f32 - radius as f32;
                let value = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                kernel[[row, col]] = value;
                sum += value;
            }
        }
        kernel.mapv_inplace(|w| w / sum);

        Psf { kernel, sum: 1.0 }
    }

    /// Construct a PSF from an explicit kernel array.
    ///
    /// The array must be square with an odd side length; anything else is
    /// rejected with [`SearchError::InvalidShape`]. The weights are taken
    /// as-is (no normalization), and their sum is retained.
    pub fn from_kernel(kernel: Array2<f32>) -> Result<Self, SearchError> {
        let (rows, cols) = kernel.dim();
        if rows != cols || rows % 2 == 0 || rows == 0 {
            return Err(SearchError::InvalidShape(format!(
                "PSF kernel must be square with an odd side, got {rows}x{cols}"
            )));
        }
        let sum = kernel.iter().sum();
        Ok(Psf { kernel, sum })
    }

    /// Side length of the kernel (always odd).
    pub fn dim(&self) -> usize {
        self.kernel.nrows()
    }

    /// Half-width of the kernel: `(dim - 1) / 2`.
    pub fn radius(&self) -> usize {
        (self.dim() - 1) / 2
    }

    /// Total number of weights (`dim * dim`).
    pub fn len(&self) -> usize {
        self.kernel.len()
    }

    /// A PSF always holds at least one weight.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Sum of the kernel weights, computed at construction.
    pub fn sum(&self) -> f32 {
        self.sum
    }

    /// The weight at kernel position (row, col).
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.kernel[[row, col]]
    }

    /// Borrow the underlying kernel array.
    pub fn kernel(&self) -> &Array2<f32> {
        &self.kernel
    }

    /// Element-wise square of the kernel, used to build the φ plane.
    ///
    /// The squared kernel is deliberately not renormalized: the φ
    /// denominator must carry the reduced power of the squared filter for
    /// the likelihood law Σψ/√Σφ to hold.
    pub fn squared(&self) -> Psf {
        let kernel = self.kernel.mapv(|w| w * w);
        let sum = kernel.iter().sum();
        Psf { kernel, sum }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_gaussian_normalized() {
        for sigma in [0.5f32, 1.0, 2.5] {
            let psf = Psf::gaussian(sigma);
            assert!(
                (psf.sum() - 1.0).abs() < 1e-5,
                "sigma={sigma}: kernel sum {} not normalized",
                psf.sum()
            );
            let direct: f32 = psf.kernel().iter().sum();
            assert!((direct - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_gaussian_covers_three_sigma() {
        let psf = Psf::gaussian(1.0);
        assert_eq!(psf.radius(), 3);
        assert_eq!(psf.dim(), 7);

        let psf = Psf::gaussian(0.5);
        assert_eq!(psf.radius(), 2);
        assert_eq!(psf.dim(), 5);
    }

    #[test]
    fn test_gaussian_center_peak() {
        let psf = Psf::gaussian(1.0);
        let r = psf.radius();
        let center = psf.get(r, r);
        for row in 0..psf.dim() {
            for col in 0..psf.dim() {
                if (row, col) != (r, r) {
                    assert!(center > psf.get(row, col));
                }
            }
        }
    }

    #[test]
    fn test_gaussian_symmetric() {
        let psf = Psf::gaussian(1.5);
        let d = psf.dim();
        for row in 0..d {
            for col in 0..d {
                assert_relative_eq!(
                    psf.get(row, col),
                    psf.get(d - 1 - row, d - 1 - col),
                    epsilon = 1e-7
                );
                assert_relative_eq!(psf.get(row, col), psf.get(col, row), epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn test_from_kernel_valid() {
        let kernel = array![[0.0f32, 0.1, 0.0], [0.1, 0.6, 0.1], [0.0, 0.1, 0.0]];
        let psf = Psf::from_kernel(kernel).unwrap();
        assert_eq!(psf.dim(), 3);
        assert_eq!(psf.radius(), 1);
        assert_eq!(psf.len(), 9);
        assert_relative_eq!(psf.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_from_kernel_even_side_rejected() {
        let kernel = Array2::<f32>::zeros((4, 4));
        assert!(matches!(
            Psf::from_kernel(kernel),
            Err(SearchError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_from_kernel_non_square_rejected() {
        let kernel = Array2::<f32>::zeros((3, 5));
        assert!(matches!(
            Psf::from_kernel(kernel),
            Err(SearchError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_from_kernel_empty_rejected() {
        let kernel = Array2::<f32>::zeros((0, 0));
        assert!(Psf::from_kernel(kernel).is_err());
    }

    #[test]
    fn test_squared_reduces_sum() {
        let psf = Psf::gaussian(1.0);
        let sq = psf.squared();
        assert_eq!(sq.dim(), psf.dim());
        // Squaring weights < 1 shrinks the total power.
        assert!(sq.sum() < psf.sum());
        for row in 0..psf.dim() {
            for col in 0..psf.dim() {
                let w = psf.get(row, col);
                assert_relative_eq!(sq.get(row, col), w * w, epsilon = 1e-9);
            }
        }
    }
}
