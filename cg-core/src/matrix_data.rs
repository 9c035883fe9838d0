use crate::error::CgCoreError;
use crate::value::{IndexType, ValueType};

/// One stored entry of a matrix in coordinate form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet<V: ValueType, I: IndexType> {
    pub row: I,
    pub col: I,
    pub value: V,
}

impl<V: ValueType, I: IndexType> Triplet<V, I> {
    pub fn new(row: I, col: I, value: V) -> Self {
        Self { row, col, value }
    }

    /// Builds a triplet from `usize` positions; fails if they do not fit `I`.
    pub fn from_usize(row: usize, col: usize, value: V) -> Result<Self, CgCoreError> {
        let convert = |idx: usize| {
            I::from_usize(idx).ok_or_else(|| {
                CgCoreError::InvalidArgument(format!(
                    "Index {} does not fit {} indices",
                    idx,
                    I::WIDTH
                ))
            })
        };
        Ok(Self::new(convert(row)?, convert(col)?, value))
    }

    /// Position as `usize`; negative indices are rejected.
    pub fn position(&self) -> Result<(usize, usize), CgCoreError> {
        match (self.row.to_usize(), self.col.to_usize()) {
            (Some(row), Some(col)) => Ok((row, col)),
            _ => Err(CgCoreError::InvalidArgument(format!(
                "Negative index in entry ({:?}, {:?})",
                self.row, self.col
            ))),
        }
    }
}

/// Format-neutral matrix contents, used to move data between containers and files.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixData<V: ValueType, I: IndexType> {
    /// (rows, cols)
    pub size: (usize, usize),
    pub nonzeros: Vec<Triplet<V, I>>,
}

impl<V: ValueType, I: IndexType> MatrixData<V, I> {
    pub fn new(size: (usize, usize)) -> Self {
        Self {
            size,
            nonzeros: Vec::new(),
        }
    }

    pub fn with_nonzeros(size: (usize, usize), nonzeros: Vec<Triplet<V, I>>) -> Self {
        Self { size, nonzeros }
    }

    /// Sorts entries by row, then by column. The sort is stable, so duplicates
    /// keep their relative order.
    pub fn ensure_row_major_order(&mut self) {
        self.nonzeros.sort_by_key(|entry| (entry.row, entry.col));
    }

    pub fn is_row_major_ordered(&self) -> bool {
        self.nonzeros
            .windows(2)
            .all(|pair| (pair[0].row, pair[0].col) <= (pair[1].row, pair[1].col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_row_major() {
        let mut data = MatrixData::with_nonzeros(
            (2, 2),
            vec![
                Triplet::new(1i32, 0, 3.0),
                Triplet::new(0, 1, 2.0),
                Triplet::new(0, 0, 1.0),
            ],
        );
        assert!(!data.is_row_major_ordered());
        data.ensure_row_major_order();
        assert!(data.is_row_major_ordered());
        let values: Vec<f64> = data.nonzeros.iter().map(|t| t.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn rejects_indices_that_do_not_fit() {
        assert!(Triplet::<f32, i32>::from_usize(usize::MAX, 0, 1.0).is_err());
        assert_eq!(
            Triplet::<f32, i64>::from_usize(3, 4, 1.0).unwrap().position().unwrap(),
            (3, 4)
        );
        assert!(Triplet::<f32, i32>::new(-1, 0, 1.0).position().is_err());
    }
}
