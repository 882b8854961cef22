//! Bridge between `ndarray` (tensor storage, §A.3) and `faer` (the dense
//! 2-index kernels: SVD, eigendecomposition, triangular solves).
//!
//! The teacher crosses the equivalent `numpy`/PyO3-to-`faer` boundary with
//! `faer_ext::IntoFaer` (`lib.rs`); here the boundary is `ndarray` instead,
//! so we pull in the same crate's `ndarray` feature rather than hand-rolling
//! the copy loop ourselves.

use faer::{Mat, MatRef};
use faer_ext::{IntoFaer, IntoNdarray};
use ndarray::{Array2, ArrayView2};

use crate::C64;

/// Copy an `ndarray` matrix view into an owned `faer` matrix.
pub fn to_faer(a: ArrayView2<C64>) -> Mat<C64> {
    a.into_faer().to_owned()
}

/// Copy a `faer` matrix (by reference) into an owned `ndarray` matrix.
pub fn to_ndarray(a: MatRef<C64>) -> Array2<C64> {
    a.into_ndarray().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn round_trips() {
        let a = arr2(&[
            [C64::new(1., 0.), C64::new(0., 1.)],
            [C64::new(2., -1.), C64::new(0., 0.)],
        ]);
        let m = to_faer(a.view());
        let back = to_ndarray(m.as_ref());
        assert_eq!(a, back);
    }
}
