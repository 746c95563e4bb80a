use std::sync::Arc;

use crate::error::Error;
use crate::vector::{Orientation, Vector};

/// An ordered sequence of vectors that share one orientation. `M1` and `M2`
/// are long-lived slots owned by the evaluator; their contents are replaced
/// wholesale on every operator, so `Matrix` itself carries no lock of its
/// own — the evaluator only ever touches a matrix from one thread at a
/// time, and concurrency lives in the member vectors.
#[derive(Clone, Default)]
pub struct Matrix {
    vectors: Vec<Arc<Vector>>,
}

impl Matrix {
    pub fn empty() -> Self {
        Self { vectors: Vec::new() }
    }

    /// Replaces the contents with one ROW-oriented vector per input row.
    /// Copies the input; fails on ragged rows.
    pub fn load_row_major(&mut self, data: Vec<Vec<f64>>) -> Result<(), Error> {
        validate_rectangular(&data)?;
        self.vectors = data
            .into_iter()
            .map(|row| Arc::new(Vector::new(row, Orientation::Row)))
            .collect();
        Ok(())
    }

    /// Stores a caller-supplied row-major array as one COLUMN-oriented
    /// vector per input column — the data is transposed on load.
    pub fn load_column_major(&mut self, data: Vec<Vec<f64>>) -> Result<(), Error> {
        validate_rectangular(&data)?;
        let rows = data.len();
        let cols = data.first().map(Vec::len).unwrap_or(0);
        let mut columns = vec![Vec::with_capacity(rows); cols];
        for row in &data {
            for (c, value) in row.iter().enumerate() {
                columns[c].push(*value);
            }
        }
        self.vectors = columns
            .into_iter()
            .map(|col| Arc::new(Vector::new(col, Orientation::Column)))
            .collect();
        Ok(())
    }

    /// Returns a freshly allocated row-major copy, transposing on read if
    /// the matrix is stored COLUMN-major. Acquires a read-lock guard on
    /// every member vector up front and holds all of them for the duration
    /// of the copy, so the caller observes one consistent snapshot across
    /// the whole matrix rather than one independently-locked vector at a
    /// time.
    pub fn read_row_major(&self) -> Vec<Vec<f64>> {
        let guards: Vec<_> = self.vectors.iter().map(|v| v.read_guard()).collect();
        let Some(orientation) = guards.first().map(|g| g.orientation) else {
            return Vec::new();
        };
        match orientation {
            Orientation::Row => guards.iter().map(|g| g.data.clone()).collect(),
            Orientation::Column => {
                let height = guards.first().map(|g| g.data.len()).unwrap_or(0);
                (0..height)
                    .map(|r| guards.iter().map(|g| g.data[r]).collect())
                    .collect()
            }
        }
    }

    pub fn get(&self, index: usize) -> Result<&Arc<Vector>, Error> {
        self.vectors.get(index).ok_or(Error::OutOfBounds {
            index,
            length: self.vectors.len(),
        })
    }

    pub fn length(&self) -> usize {
        self.vectors.len()
    }

    /// Derived from a member vector rather than stored separately, so the
    /// matrix can never skew out of sync with its own contents.
    pub fn orientation(&self) -> Option<Orientation> {
        self.vectors.first().map(|v| v.orientation())
    }

    pub fn rows(&self) -> usize {
        match self.orientation() {
            None => 0,
            Some(Orientation::Row) => self.vectors.len(),
            Some(Orientation::Column) => self.vectors.first().map(|v| v.length()).unwrap_or(0),
        }
    }

    pub fn cols(&self) -> usize {
        match self.orientation() {
            None => 0,
            Some(Orientation::Row) => self.vectors.first().map(|v| v.length()).unwrap_or(0),
            Some(Orientation::Column) => self.vectors.len(),
        }
    }
}

fn validate_rectangular(data: &[Vec<f64>]) -> Result<(), Error> {
    let Some(first) = data.first() else {
        return Ok(());
    };
    let width = first.len();
    if data.iter().any(|row| row.len() != width) {
        return Err(Error::InvalidArgument(
            "matrix rows must all have the same length".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_round_trips() {
        let mut m = Matrix::empty();
        let input = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        m.load_row_major(input.clone()).unwrap();
        assert_eq!(m.read_row_major(), input);
    }

    #[test]
    fn column_major_round_trips_to_the_same_row_major_shape() {
        let mut m = Matrix::empty();
        let input = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        m.load_column_major(input.clone()).unwrap();
        assert_eq!(m.orientation(), Some(Orientation::Column));
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.read_row_major(), input);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut m = Matrix::empty();
        let bad = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            m.load_row_major(bad),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn loading_replaces_prior_contents_by_value_not_reference() {
        let mut m = Matrix::empty();
        let mut input = vec![vec![1.0]];
        m.load_row_major(input.clone()).unwrap();
        input[0][0] = 99.0;
        assert_eq!(m.read_row_major(), vec![vec![1.0]]);
    }

    proptest::proptest! {
        #[test]
        fn row_major_round_trips_for_arbitrary_rectangles(
            data in proptest::collection::vec(proptest::collection::vec(-1000.0f64..1000.0, 1..6), 1..6)
        ) {
            let width = data[0].len();
            let data: Vec<Vec<f64>> = data.into_iter().map(|mut row| {
                row.resize(width, 0.0);
                row
            }).collect();
            let mut m = Matrix::empty();
            m.load_row_major(data.clone()).unwrap();
            proptest::prop_assert_eq!(m.read_row_major(), data);
        }

        #[test]
        fn column_major_load_then_read_transposes_back_to_the_input(
            data in proptest::collection::vec(proptest::collection::vec(-1000.0f64..1000.0, 1..6), 1..6)
        ) {
            let width = data[0].len();
            let data: Vec<Vec<f64>> = data.into_iter().map(|mut row| {
                row.resize(width, 0.0);
                row
            }).collect();
            let mut m = Matrix::empty();
            m.load_column_major(data.clone()).unwrap();
            proptest::prop_assert_eq!(m.rows(), data.len());
            proptest::prop_assert_eq!(m.cols(), width);
            proptest::prop_assert_eq!(m.read_row_major(), data);
        }
    }
}
