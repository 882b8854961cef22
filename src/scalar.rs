//! Scalar-kind promotion (§A.3, §A.4.1; see `SPEC_FULL.md` §B.4).
//!
//! Tensors are always stored as `C64` internally (the teacher does the same
//! for quantities that are sometimes real, e.g. `Az`); `ScalarKind` is
//! metadata tracking whether a chain's true content is real, used to pick the
//! random-MPS distribution and to decide whether observable output should
//! drop an imaginary part that is zero by construction.
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Real,
    Complex,
}

impl ScalarKind {
    /// The promotion of two kinds: complex dominates real.
    pub fn promote(self, other: ScalarKind) -> ScalarKind {
        match (self, other) {
            (ScalarKind::Complex, _) | (_, ScalarKind::Complex) => ScalarKind::Complex,
            _ => ScalarKind::Real,
        }
    }

    pub fn promote_all(kinds: impl IntoIterator<Item = ScalarKind>) -> ScalarKind {
        kinds
            .into_iter()
            .fold(ScalarKind::Real, ScalarKind::promote)
    }
}

impl PartialOrd for ScalarKind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScalarKind {
    fn cmp(&self, other: &Self) -> Ordering {
        use ScalarKind::*;
        match (self, other) {
            (Real, Real) | (Complex, Complex) => Ordering::Equal,
            (Real, Complex) => Ordering::Less,
            (Complex, Real) => Ordering::Greater,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex_dominates() {
        assert_eq!(ScalarKind::Real.promote(ScalarKind::Complex), ScalarKind::Complex);
        assert_eq!(ScalarKind::Complex.promote(ScalarKind::Real), ScalarKind::Complex);
        assert_eq!(ScalarKind::Real.promote(ScalarKind::Real), ScalarKind::Real);
    }

    #[test]
    fn promote_all_over_empty_is_real() {
        assert_eq!(ScalarKind::promote_all(std::iter::empty()), ScalarKind::Real);
    }
}
