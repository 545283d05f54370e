//! Types and small tensor helpers used throughout this crate
use ndarray::Array1;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

/// Spatial dimension of the discretization
pub const DIM: usize = 2;

/// Discrete field, one entry per degree of freedom
pub type DofVector = Array1<f64>;

/// Point in physical space
pub type Point = [f64; DIM];

/// Scalar type, used for tensor arithmetic at quadrature points
pub trait Scalar: num_traits::Float + SubAssign + AddAssign + MulAssign + DivAssign {}

impl<T> Scalar for T where T: num_traits::Float + SubAssign + AddAssign + MulAssign + DivAssign {}

/// Square tensor of rank two, stored row-major as `t[i][j]`
pub type Tensor<T, const N: usize> = [[T; N]; N];

/// Symmetric part $ \frac{1}{2}(A + A^T) $
pub fn symmetric_part<T: Scalar, const N: usize>(a: &Tensor<T, N>) -> Tensor<T, N> {
    let half = T::from(0.5).unwrap_or_else(T::zero);
    let mut s = [[T::zero(); N]; N];
    for i in 0..N {
        for j in 0..N {
            s[i][j] = half * (a[i][j] + a[j][i]);
        }
    }
    s
}

/// Matrix product $ A B $
pub fn matmul<T: Scalar, const N: usize>(a: &Tensor<T, N>, b: &Tensor<T, N>) -> Tensor<T, N> {
    let mut c = [[T::zero(); N]; N];
    for i in 0..N {
        for j in 0..N {
            for k in 0..N {
                c[i][j] += a[i][k] * b[k][j];
            }
        }
    }
    c
}

/// Transpose
pub fn transpose<T: Scalar, const N: usize>(a: &Tensor<T, N>) -> Tensor<T, N> {
    let mut t = [[T::zero(); N]; N];
    for i in 0..N {
        for j in 0..N {
            t[i][j] = a[j][i];
        }
    }
    t
}

/// Double contraction $ A:B = \sum_{ij} A_{ij} B_{ij} $
pub fn double_contract<T: Scalar, const N: usize>(a: &Tensor<T, N>, b: &Tensor<T, N>) -> T {
    let mut sum = T::zero();
    for i in 0..N {
        for j in 0..N {
            sum += a[i][j] * b[i][j];
        }
    }
    sum
}

/// Trace
pub fn trace<T: Scalar, const N: usize>(a: &Tensor<T, N>) -> T {
    let mut sum = T::zero();
    for (i, row) in a.iter().enumerate() {
        sum += row[i];
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_helpers() {
        let a = [[1., 2.], [3., 4.]];
        let s = symmetric_part(&a);
        assert_eq!(s, [[1., 2.5], [2.5, 4.]]);
        assert_eq!(transpose(&a), [[1., 3.], [2., 4.]]);
        assert_eq!(matmul(&a, &a), [[7., 10.], [15., 22.]]);
        assert_eq!(double_contract(&a, &a), 30.);
        assert_eq!(trace(&a), 5.);
    }
}
