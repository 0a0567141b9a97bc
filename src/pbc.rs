//! Periodic simulation boxes and minimum-image vectors.

use crate::errors::CmDataError;
use nalgebra::{Matrix3, Vector3};

/// Anything able to produce the minimum-image difference vector `a - b`.
pub trait MinimumImage {
    fn dx(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> Vector3<f64>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoxShape {
    Rectangular,
    Triclinic,
}

/// Simulation box with lower-triangular box vectors stored as matrix rows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimBox {
    vectors: Matrix3<f64>,
    shape: BoxShape,
}

impl SimBox {
    /// Build a box from its three vectors (one per row). The vectors must be in
    /// lower-triangular form: `a` along x and `b` in the xy-plane.
    pub fn from_matrix(vectors: Matrix3<f64>) -> Result<Self, CmDataError> {
        if (0..3).any(|i| !(vectors[(i, i)].is_finite() && vectors[(i, i)] > 0.0)) {
            return Err(CmDataError::InvalidSettings(format!(
                "box diagonal must be positive, got {:?}",
                vectors.diagonal().as_slice()
            )));
        }
        if vectors[(0, 1)] != 0.0 || vectors[(0, 2)] != 0.0 || vectors[(1, 2)] != 0.0 {
            return Err(CmDataError::InvalidSettings(
                "box vectors must be lower triangular".to_string(),
            ));
        }
        let shape = if vectors[(1, 0)] == 0.0 && vectors[(2, 0)] == 0.0 && vectors[(2, 1)] == 0.0
        {
            BoxShape::Rectangular
        } else {
            BoxShape::Triclinic
        };
        Ok(Self { vectors, shape })
    }

    pub fn rectangular(lx: f64, ly: f64, lz: f64) -> Result<Self, CmDataError> {
        Self::from_matrix(Matrix3::from_diagonal(&Vector3::new(lx, ly, lz)))
    }

    /// Build a box from cell edge lengths and angles in degrees, as found in
    /// crystallographic unit cells.
    pub fn from_lengths_angles(
        lengths: [f64; 3],
        angles: [f64; 3],
    ) -> Result<Self, CmDataError> {
        let [a, b, c] = lengths;
        let [alpha, beta, gamma] = angles.map(f64::to_radians);
        let orthogonal = angles.iter().all(|angle| (angle - 90.0).abs() < 1e-6);
        if orthogonal {
            return Self::rectangular(a, b, c);
        }

        let bx = b * gamma.cos();
        let by = b * gamma.sin();
        let cx = c * beta.cos();
        let cy = c * (alpha.cos() - beta.cos() * gamma.cos()) / gamma.sin();
        let cz2 = c * c - cx * cx - cy * cy;
        if cz2 <= 0.0 {
            return Err(CmDataError::InvalidSettings(format!(
                "degenerate cell angles {angles:?}"
            )));
        }
        #[rustfmt::skip]
        let vectors = Matrix3::new(
            a, 0.0, 0.0,
            bx, by, 0.0,
            cx, cy, cz2.sqrt(),
        );
        Self::from_matrix(vectors)
    }

    pub fn shape(&self) -> BoxShape {
        self.shape
    }

    pub fn vectors(&self) -> &Matrix3<f64> {
        &self.vectors
    }

    fn vector(&self, row: usize) -> Vector3<f64> {
        self.vectors.row(row).transpose()
    }
}

impl MinimumImage for SimBox {
    fn dx(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> Vector3<f64> {
        let mut d = a - b;
        match self.shape {
            BoxShape::Rectangular => {
                for m in 0..3 {
                    let l = self.vectors[(m, m)];
                    d[m] -= (d[m] / l).round() * l;
                }
            }
            BoxShape::Triclinic => {
                // Reduce along c, then b, then a
                for m in (0..3).rev() {
                    let shift = (d[m] / self.vectors[(m, m)]).round();
                    if shift != 0.0 {
                        d -= self.vector(m) * shift;
                    }
                }
            }
        }
        d
    }
}

/// Minimum-image vector when a box is present, plain subtraction otherwise.
pub fn pbc_dx(
    pbc: Option<&impl MinimumImage>,
    a: &Vector3<f64>,
    b: &Vector3<f64>,
) -> Vector3<f64> {
    match pbc {
        Some(pbc) => pbc.dx(a, b),
        None => a - b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangular_wraps() {
        let simbox = SimBox::rectangular(3.0, 4.0, 5.0).unwrap();
        assert_eq!(simbox.shape(), BoxShape::Rectangular);

        let a = Vector3::new(0.1, 0.2, 0.3);
        let b = Vector3::new(2.9, 3.9, 4.9);
        let d = simbox.dx(&a, &b);
        assert!((d - Vector3::new(0.2, 0.3, 0.4)).norm() < 1e-12, "Got {d:?}");

        // Within half a box length nothing changes
        let c = Vector3::new(1.0, 1.0, 1.0);
        assert!((simbox.dx(&c, &a) - (c - a)).norm() < 1e-12);
    }

    #[test]
    fn test_no_box_subtracts() {
        let a = Vector3::new(10.0, 0.0, 0.0);
        let b = Vector3::new(0.0, 0.0, 0.0);
        assert_eq!(pbc_dx(None::<&SimBox>, &a, &b), a);
    }

    #[test]
    fn test_triclinic_from_angles() {
        let simbox = SimBox::from_lengths_angles([5.0, 5.0, 5.0], [90.0, 90.0, 60.0]).unwrap();
        assert_eq!(simbox.shape(), BoxShape::Triclinic);

        // Two points one b-vector apart are images of each other
        let b_vec = simbox.vectors().row(1).transpose();
        let a = Vector3::new(0.5, 0.5, 0.5);
        let d = simbox.dx(&(a + b_vec), &a);
        assert!(d.norm() < 1e-9, "Expected zero vector, got {d:?}");

        let orthogonal = SimBox::from_lengths_angles([2.0, 3.0, 4.0], [90.0, 90.0, 90.0]).unwrap();
        assert_eq!(orthogonal.shape(), BoxShape::Rectangular);
    }

    #[test]
    fn test_invalid_boxes() {
        assert!(SimBox::rectangular(0.0, 1.0, 1.0).is_err());
        #[rustfmt::skip]
        let upper = Matrix3::new(
            1.0, 0.5, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        );
        assert!(SimBox::from_matrix(upper).is_err());
    }
}
