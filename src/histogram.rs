//! Distance histograms and the kernel density estimator feeding them.

use crate::settings::{BANDWIDTH, OVERSAMPLING, TRUNCATION_NORM};
use std::f64::consts::PI;

/// Fixed-width bins covering `[0, cutoff)`, shared by every histogram.
#[derive(Clone, Debug, PartialEq)]
pub struct BinGrid {
    cutoff: f64,
    centers: Vec<f64>,
}

impl BinGrid {
    pub fn new(cutoff: f64) -> Self {
        let n = n_bins(cutoff, OVERSAMPLING);
        let dx = cutoff / n as f64;
        let centers = (0..n).map(|i| dx * i as f64 + 0.5 * dx).collect();
        Self { cutoff, centers }
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Bin width.
    pub fn dx(&self) -> f64 {
        self.cutoff / self.centers.len() as f64
    }

    pub fn centers(&self) -> &[f64] {
        &self.centers
    }
}

/// Number of bins for a cutoff: `factor` bins per 0.01 distance units.
pub fn n_bins(cutoff: f64, factor: f64) -> usize {
    let raw = cutoff / (0.01 / factor);
    // Absorb representation error so that e.g. 0.75 nm gives exactly 300 bins
    let n = if (raw - raw.round()).abs() < 1e-9 {
        raw.round()
    } else {
        raw.floor()
    };
    (n as usize).max(1)
}

/// Add a truncated Gaussian bump of area ~`norm` centered at `mu` into `hist`.
///
/// Only bins within `mu ± 2h` are touched, and the kernel is shifted down by
/// `exp(-2)` so it reaches zero at the truncation points. Below `mu < h` the
/// contribution is doubled, reflecting the mass lost below zero distance.
pub fn kernel_density_estimator(hist: &mut [f64], grid: &BinGrid, mu: f64, norm: f64) {
    let bins = grid.centers();
    let (Some(&first), Some(&last)) = (bins.first(), bins.last()) else {
        return;
    };
    let h = BANDWIDTH;
    let from_x = (mu - 2.0 * h).max(first);
    let to_x = (mu + 2.0 * h).min(last);
    let from = bins.partition_point(|&x| x < from_x);
    let to = bins.partition_point(|&x| x <= to_x);
    // Distances are never negative
    if !mu.is_finite() || mu < 0.0 || from >= to {
        return;
    }

    let mut scale = norm / (TRUNCATION_NORM * h * (2.0 * PI).sqrt());
    if mu < h {
        scale *= 2.0;
    }
    let shift = (-2.0f64).exp();
    for (value, &x) in hist[from..to].iter_mut().zip(&bins[from..to]) {
        let f = (mu - x) / h;
        let kernel = (-0.5 * f * f).exp();
        *value += scale * (kernel - shift);
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Block {
    offset: usize,
    rows: usize,
    cols: usize,
}

/// A collection of `rows x cols` matrices of histograms stored in one flat
/// buffer, addressed by `(block, a, b, bin)`.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityTensor {
    blocks: Vec<Block>,
    n_bins: usize,
    data: Vec<f64>,
}

impl DensityTensor {
    /// Allocate a zero-filled tensor with one `(rows, cols)` block per entry
    /// of `shapes`.
    pub fn zeros(shapes: &[(usize, usize)], n_bins: usize) -> Self {
        let mut offset = 0;
        let blocks = shapes
            .iter()
            .map(|&(rows, cols)| {
                let block = Block { offset, rows, cols };
                offset += rows * cols * n_bins;
                block
            })
            .collect();
        Self {
            blocks,
            n_bins,
            data: vec![0.0; offset],
        }
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// Matrix shape `(rows, cols)` of a block.
    pub fn shape(&self, block: usize) -> (usize, usize) {
        let b = &self.blocks[block];
        (b.rows, b.cols)
    }

    fn offset(&self, block: usize, a: usize, b: usize) -> Option<usize> {
        let blk = self.blocks.get(block)?;
        if a >= blk.rows || b >= blk.cols {
            return None;
        }
        Some(blk.offset + (a * blk.cols + b) * self.n_bins)
    }

    pub fn get(&self, block: usize, a: usize, b: usize) -> Option<&[f64]> {
        let start = self.offset(block, a, b)?;
        Some(&self.data[start..start + self.n_bins])
    }

    pub fn get_mut(&mut self, block: usize, a: usize, b: usize) -> Option<&mut [f64]> {
        let start = self.offset(block, a, b)?;
        let n_bins = self.n_bins;
        Some(&mut self.data[start..start + n_bins])
    }

    /// Histogram of atom pair `(a, b)` in `block`.
    ///
    /// # Panics
    ///
    /// Panics if the indices are outside the block shape.
    pub fn histogram(&self, block: usize, a: usize, b: usize) -> &[f64] {
        self.get(block, a, b).unwrap_or_else(|| {
            panic!("Histogram index ({block}, {a}, {b}) is out of bounds")
        })
    }

    /// Mutable histogram of atom pair `(a, b)` in `block`.
    ///
    /// # Panics
    ///
    /// Panics if the indices are outside the block shape.
    pub fn histogram_mut(&mut self, block: usize, a: usize, b: usize) -> &mut [f64] {
        match self.offset(block, a, b) {
            Some(start) => {
                let n_bins = self.n_bins;
                &mut self.data[start..start + n_bins]
            }
            None => panic!("Histogram index ({block}, {a}, {b}) is out of bounds"),
        }
    }

    /// Multiply every bin by `factor`.
    pub fn scale(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|v| *v *= factor);
    }

    /// Element-wise sum with a tensor of identical layout.
    ///
    /// # Panics
    ///
    /// Panics if the layouts differ.
    pub fn add_assign(&mut self, other: &DensityTensor) {
        assert!(
            self.blocks == other.blocks && self.n_bins == other.n_bins,
            "Cannot add density tensors with different layouts"
        );
        self.data
            .iter_mut()
            .zip(&other.data)
            .for_each(|(a, b)| *a += b);
    }

    /// Copy every upper-triangle histogram `(a, b)`, `a < b`, onto `(b, a)`
    /// in all square blocks.
    pub fn mirror_upper_triangle(&mut self) {
        let n_bins = self.n_bins;
        for blk in self.blocks.clone() {
            if blk.rows != blk.cols {
                continue;
            }
            for a in 0..blk.rows {
                for b in (a + 1)..blk.cols {
                    let src = blk.offset + (a * blk.cols + b) * n_bins;
                    let dst = blk.offset + (b * blk.cols + a) * n_bins;
                    self.data.copy_within(src..src + n_bins, dst);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_grid() {
        let grid = BinGrid::new(0.75);
        assert_eq!(grid.len(), 300);
        assert!((grid.dx() - 0.0025).abs() < 1e-12);
        assert!((grid.centers()[0] - 0.00125).abs() < 1e-12);
        assert!(grid.centers().windows(2).all(|w| w[1] > w[0]));
        assert!(grid
            .centers()
            .windows(2)
            .all(|w| ((w[1] - w[0]) - grid.dx()).abs() < 1e-12));
        assert!(*grid.centers().last().unwrap() < 0.75);

        for cutoff in [0.1, 0.5, 0.55, 1.0, 1.2] {
            let expected = (cutoff / 0.0025_f64).round() as usize;
            assert_eq!(BinGrid::new(cutoff).len(), expected, "cutoff {cutoff}");
        }
    }

    #[test]
    fn test_kernel_support_and_linearity() {
        let grid = BinGrid::new(0.75);
        let mu = 0.4;

        let mut once = vec![0.0; grid.len()];
        kernel_density_estimator(&mut once, &grid, mu, 0.5);
        let mut twice = vec![0.0; grid.len()];
        kernel_density_estimator(&mut twice, &grid, mu, 0.5);
        kernel_density_estimator(&mut twice, &grid, mu, 0.5);
        for (a, b) in once.iter().zip(&twice) {
            assert!((2.0 * a - b).abs() < 1e-12);
        }

        // Only bins within mu ± 2h are touched
        for (x, v) in grid.centers().iter().zip(&once) {
            if (x - mu).abs() > 2.0 * BANDWIDTH + 1e-12 {
                assert_eq!(*v, 0.0, "Bin at {x} should be untouched");
            }
        }

        // Peak sits at mu
        let peak = once
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| grid.centers()[i])
            .unwrap();
        assert!((peak - mu).abs() <= grid.dx());
    }

    #[test]
    fn test_kernel_area() {
        let grid = BinGrid::new(0.75);
        let mut hist = vec![0.0; grid.len()];
        kernel_density_estimator(&mut hist, &grid, 0.3, 1.0);
        let area: f64 = hist.iter().map(|v| v * grid.dx()).sum();
        assert!((area - 1.0).abs() < 0.01, "Kernel area {area} should be ~1");
    }

    #[test]
    fn test_kernel_reflects_at_zero() {
        let grid = BinGrid::new(0.75);
        let mut hist = vec![0.0; grid.len()];
        kernel_density_estimator(&mut hist, &grid, 0.0, 1.0);
        let area: f64 = hist.iter().map(|v| v * grid.dx()).sum();
        assert!((area - 1.0).abs() < 0.02, "Reflected area {area} should be ~1");
    }

    #[test]
    fn test_kernel_outside_domain() {
        let grid = BinGrid::new(0.75);
        let mut hist = vec![0.0; grid.len()];
        kernel_density_estimator(&mut hist, &grid, 2.0, 1.0);
        assert!(hist.iter().all(|&v| v == 0.0));

        for mu in [-0.5, -0.015, f64::NAN] {
            kernel_density_estimator(&mut hist, &grid, mu, 1.0);
            assert!(hist.iter().all(|&v| v == 0.0), "mu = {mu} touched the histogram");
        }
    }

    #[test]
    fn test_tensor_layout() {
        let mut tensor = DensityTensor::zeros(&[(2, 2), (3, 1)], 4);
        assert_eq!(tensor.n_blocks(), 2);
        assert_eq!(tensor.shape(1), (3, 1));
        assert!(tensor.get(0, 2, 0).is_none());
        assert!(tensor.get(1, 2, 0).is_some());
        assert!(tensor.get(2, 0, 0).is_none());

        tensor.histogram_mut(1, 2, 0)[3] = 1.5;
        assert_eq!(tensor.histogram(1, 2, 0), &[0.0, 0.0, 0.0, 1.5]);
        assert!(tensor.histogram(0, 1, 1).iter().all(|&v| v == 0.0));

        let copy = tensor.clone();
        tensor.add_assign(&copy);
        tensor.scale(0.25);
        assert_eq!(tensor.histogram(1, 2, 0)[3], 0.75);
    }

    #[test]
    fn test_mirror_upper_triangle() {
        let mut tensor = DensityTensor::zeros(&[(3, 3), (2, 3)], 2);
        tensor.histogram_mut(0, 0, 2).copy_from_slice(&[1.0, 2.0]);
        tensor.histogram_mut(0, 2, 0).copy_from_slice(&[9.0, 9.0]);
        tensor.histogram_mut(1, 0, 1).copy_from_slice(&[3.0, 4.0]);
        tensor.mirror_upper_triangle();

        assert_eq!(tensor.histogram(0, 2, 0), &[1.0, 2.0]);
        assert_eq!(tensor.histogram(0, 0, 2), &[1.0, 2.0]);
        // Non-square blocks are left alone
        assert_eq!(tensor.histogram(1, 1, 0), &[0.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_out_of_bounds_access() {
        let tensor = DensityTensor::zeros(&[(2, 2)], 4);
        tensor.histogram(0, 2, 0);
    }
}
