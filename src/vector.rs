use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

use crate::error::Error;
use crate::matrix::Matrix;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A vector's tag identifying it as a row or a column. Matrix orientation is
/// always derived from its member vectors, never stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Row,
    Column,
}

pub(crate) struct Inner {
    pub(crate) data: Vec<f64>,
    pub(crate) orientation: Orientation,
}

/// One contiguous sequence of doubles plus an orientation tag, guarded by a
/// reader-writer lock. `id` is a monotonic creation index used only to order
/// lock acquisition across vectors; it has no bearing on the vector's value.
pub struct Vector {
    id: u64,
    inner: RwLock<Inner>,
}

impl Vector {
    pub fn new(data: Vec<f64>, orientation: Orientation) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            inner: RwLock::new(Inner { data, orientation }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn length(&self) -> usize {
        self.inner.read().unwrap().data.len()
    }

    pub fn orientation(&self) -> Orientation {
        self.inner.read().unwrap().orientation
    }

    pub fn get(&self, index: usize) -> Result<f64, Error> {
        let inner = self.inner.read().unwrap();
        inner
            .data
            .get(index)
            .copied()
            .ok_or(Error::OutOfBounds {
                index,
                length: inner.data.len(),
            })
    }

    pub fn snapshot(&self) -> Vec<f64> {
        self.inner.read().unwrap().data.clone()
    }

    /// Acquires and holds a read lock on this vector, for callers (namely
    /// `Matrix::read_row_major`) that must hold several vectors' locks
    /// simultaneously to take one consistent snapshot across all of them.
    pub(crate) fn read_guard(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap()
    }

    pub fn transpose(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.orientation = match inner.orientation {
            Orientation::Row => Orientation::Column,
            Orientation::Column => Orientation::Row,
        };
    }

    pub fn negate(&self) {
        let mut inner = self.inner.write().unwrap();
        for x in inner.data.iter_mut() {
            *x = -*x;
        }
    }

    /// `this += other`. Locks `this` for write and `other` for read, in
    /// ascending creation-id order. If `other` is the same vector, upgrades
    /// to a single write-lock and doubles in place rather than attempting to
    /// hold a read and a write lock on the same identity at once.
    pub fn add(&self, other: &Vector) -> Result<(), Error> {
        if self.id == other.id {
            let mut inner = self.inner.write().unwrap();
            for x in inner.data.iter_mut() {
                *x += *x;
            }
            return Ok(());
        }

        if self.id < other.id {
            let mut a = self.inner.write().unwrap();
            let b = other.inner.read().unwrap();
            add_into(&mut a.data, &b.data)
        } else {
            let b = other.inner.read().unwrap();
            let mut a = self.inner.write().unwrap();
            add_into(&mut a.data, &b.data)
        }
    }

    /// Sum of products. Self-dot read-locks once and returns the sum of
    /// squares; the two-vector case read-locks both, in ascending id order.
    pub fn dot(&self, other: &Vector) -> Result<f64, Error> {
        if self.id == other.id {
            let inner = self.inner.read().unwrap();
            return Ok(inner.data.iter().map(|x| x * x).sum());
        }

        if self.id < other.id {
            let a = self.inner.read().unwrap();
            let b = other.inner.read().unwrap();
            dot_of(&a.data, &b.data)
        } else {
            let b = other.inner.read().unwrap();
            let a = self.inner.read().unwrap();
            dot_of(&a.data, &b.data)
        }
    }

    /// Replaces `this.data` with `this x matrix`, treating `this` as a row
    /// vector. Reads every column of `matrix` under its own read lock,
    /// accumulating into a private buffer, then takes a single write lock on
    /// `this` to install the result. Never holds a read lock on `this` while
    /// writing it.
    pub fn vec_mat_mul(&self, matrix: &Matrix) -> Result<(), Error> {
        if self.orientation() != Orientation::Row {
            return Err(Error::InvalidState(
                "vecMatMul requires a row-oriented vector".into(),
            ));
        }

        let lhs = self.snapshot();
        if lhs.len() != matrix.rows() {
            return Err(Error::DimensionMismatch(format!(
                "vector of length {} cannot multiply a matrix with {} rows",
                lhs.len(),
                matrix.rows()
            )));
        }

        let cols = matrix.cols();
        let mut result = vec![0.0f64; cols];
        for (c, slot) in result.iter_mut().enumerate() {
            let column = matrix.get(c)?;
            let rhs = column.inner.read().unwrap();
            *slot = lhs.iter().zip(rhs.data.iter()).map(|(x, y)| x * y).sum();
        }

        let mut inner = self.inner.write().unwrap();
        inner.data = result;
        Ok(())
    }
}

fn add_into(a: &mut [f64], b: &[f64]) -> Result<(), Error> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch(format!(
            "cannot add vectors of length {} and {}",
            a.len(),
            b.len()
        )));
    }
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x += *y;
    }
    Ok(())
}

fn dot_of(a: &[f64], b: &[f64]) -> Result<f64, Error> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch(format!(
            "cannot dot vectors of length {} and {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_elementwise() {
        let a = Vector::new(vec![1.0, 2.0], Orientation::Row);
        let b = Vector::new(vec![10.0, 20.0], Orientation::Row);
        a.add(&b).unwrap();
        assert_eq!(a.snapshot(), vec![11.0, 22.0]);
    }

    #[test]
    fn self_add_doubles_in_place() {
        let a = Vector::new(vec![1.0, -2.0, 3.5], Orientation::Row);
        a.add(&a).unwrap();
        assert_eq!(a.snapshot(), vec![2.0, -4.0, 7.0]);
    }

    #[test]
    fn self_dot_is_sum_of_squares() {
        let a = Vector::new(vec![3.0, 4.0], Orientation::Row);
        assert_eq!(a.dot(&a).unwrap(), 25.0);
    }

    #[test]
    fn add_rejects_mismatched_lengths() {
        let a = Vector::new(vec![1.0], Orientation::Row);
        let b = Vector::new(vec![1.0, 2.0], Orientation::Row);
        assert!(matches!(a.add(&b), Err(Error::DimensionMismatch(_))));
    }

    #[test]
    fn transpose_is_involutive() {
        let v = Vector::new(vec![1.0, 2.0, 3.0], Orientation::Row);
        v.transpose();
        assert_eq!(v.orientation(), Orientation::Column);
        v.transpose();
        assert_eq!(v.orientation(), Orientation::Row);
        assert_eq!(v.snapshot(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn negate_flips_sign_of_every_entry() {
        let v = Vector::new(vec![1.0, -2.0, 0.0], Orientation::Row);
        v.negate();
        assert_eq!(v.snapshot(), vec![-1.0, 2.0, 0.0]);
    }

    #[test]
    fn get_reports_out_of_bounds() {
        let v = Vector::new(vec![1.0], Orientation::Row);
        assert!(matches!(
            v.get(3),
            Err(Error::OutOfBounds { index: 3, length: 1 })
        ));
    }

    #[test]
    fn nan_propagates_through_add() {
        let a = Vector::new(vec![f64::NAN], Orientation::Row);
        let b = Vector::new(vec![1.0], Orientation::Row);
        a.add(&b).unwrap();
        assert!(a.snapshot()[0].is_nan());
    }

    proptest::proptest! {
        #[test]
        fn transpose_is_involutive_for_arbitrary_vectors(
            data in proptest::collection::vec(-1000.0f64..1000.0, 0..20)
        ) {
            let v = Vector::new(data.clone(), Orientation::Row);
            v.transpose();
            v.transpose();
            proptest::prop_assert_eq!(v.orientation(), Orientation::Row);
            proptest::prop_assert_eq!(v.snapshot(), data);
        }

        #[test]
        fn add_matches_pointwise_sum_for_same_length_vectors(
            pairs in proptest::collection::vec((-1000.0f64..1000.0, -1000.0f64..1000.0), 1..10)
        ) {
            let a: Vec<f64> = pairs.iter().map(|(x, _)| *x).collect();
            let b: Vec<f64> = pairs.iter().map(|(_, y)| *y).collect();
            let expected: Vec<f64> = pairs.iter().map(|(x, y)| x + y).collect();
            let va = Vector::new(a, Orientation::Row);
            let vb = Vector::new(b, Orientation::Row);
            va.add(&vb).unwrap();
            proptest::prop_assert_eq!(va.snapshot(), expected);
        }
    }
}
