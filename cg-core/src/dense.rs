use crate::dense_gpu::DenseGpu;
use crate::device::ReferenceDevice;
use crate::error::CgCoreError;
use crate::matrix_data::{MatrixData, Triplet};
use crate::traits::Matrix;
use crate::value::{IndexType, ValueType};

/// Dense block stored in row-major order on the host: `values[row * cols + col]`.
///
/// Each column is an independent vector; per-column scalars are `n x 1` blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense<V: ValueType> {
    rows: usize,
    cols: usize,
    values: Vec<V>,
}

impl<V: ValueType> Dense<V> {
    /// Creates a zero-filled block on the reference backend.
    pub fn create(_device: &ReferenceDevice, rows: usize, cols: usize) -> Self {
        Self::zeros(rows, cols)
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: vec![V::zero(); rows * cols],
        }
    }

    /// Creates a block from row-major values.
    pub fn from_values(rows: usize, cols: usize, values: Vec<V>) -> Result<Self, CgCoreError> {
        if values.len() != rows * cols {
            return Err(CgCoreError::InvalidDimensions(format!(
                "Data length ({}) does not match dimensions ({}x{})",
                values.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, values })
    }

    /// Creates a block from a slice of rows, which must all have the same length.
    pub fn from_rows(rows: &[Vec<V>]) -> Result<Self, CgCoreError> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return Err(CgCoreError::InvalidDimensions(
                "All rows of a dense block must have the same length".to_string(),
            ));
        }
        let values = rows.iter().flatten().copied().collect();
        Self::from_values(rows.len(), cols, values)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    /// Element at (`row`, `col`). Panics when out of bounds.
    pub fn at(&self, row: usize, col: usize) -> V {
        self.values[row * self.cols + col]
    }

    pub fn at_mut(&mut self, row: usize, col: usize) -> &mut V {
        &mut self.values[row * self.cols + col]
    }

    pub fn get(&self, row: usize, col: usize) -> Option<V> {
        if row < self.rows && col < self.cols {
            self.values.get(row * self.cols + col).copied()
        } else {
            None
        }
    }

    pub fn fill(&mut self, value: V) {
        self.values.iter_mut().for_each(|v| *v = value);
    }

    /// Copies `source` into this block, taking over its dimensions.
    pub fn copy_from(&mut self, source: &Dense<V>) {
        self.rows = source.rows;
        self.cols = source.cols;
        self.values.clear();
        self.values.extend_from_slice(&source.values);
    }

    /// Reads a device block back into this one, taking over its dimensions.
    ///
    /// Waits for all work submitted on the source's context.
    pub async fn copy_from_gpu(&mut self, source: &DenseGpu<V>) -> Result<(), CgCoreError> {
        let values = source.read_contents().await?;
        self.rows = source.rows();
        self.cols = source.cols();
        self.values = values;
        Ok(())
    }

    /// Per-column `conj(self[:, j]) . other[:, j]`, written to the `cols x 1` block `result`.
    pub fn compute_dot(&self, other: &Dense<V>, result: &mut Dense<V>) -> Result<(), CgCoreError> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(CgCoreError::InvalidDimensions(format!(
                "Block shapes for dot product mismatch: {}x{} != {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        if result.rows != self.cols || result.cols != 1 {
            return Err(CgCoreError::InvalidDimensions(format!(
                "Dot product result must be {}x1, got {}x{}",
                self.cols, result.rows, result.cols
            )));
        }
        for col in 0..self.cols {
            let mut sum = V::zero();
            for row in 0..self.rows {
                let idx = row * self.cols + col;
                sum = sum + self.values[idx].conj() * other.values[idx];
            }
            result.values[col] = sum;
        }
        Ok(())
    }

    /// Euclidean norm of every column.
    pub fn compute_norm2(&self) -> Vec<f64> {
        (0..self.cols)
            .map(|col| {
                (0..self.rows)
                    .map(|row| {
                        let m = self.values[row * self.cols + col].magnitude();
                        m * m
                    })
                    .sum::<f64>()
                    .sqrt()
            })
            .collect()
    }

    /// Builds a block from interchange data; missing entries are zero.
    pub fn from_matrix_data<I: IndexType>(data: &MatrixData<V, I>) -> Result<Self, CgCoreError> {
        let (rows, cols) = data.size;
        let mut block = Self::zeros(rows, cols);
        for entry in &data.nonzeros {
            let (row, col) = entry.position()?;
            if row >= rows || col >= cols {
                return Err(CgCoreError::InvalidDimensions(format!(
                    "Entry ({}, {}) is outside a {}x{} block",
                    row, col, rows, cols
                )));
            }
            *block.at_mut(row, col) = entry.value;
        }
        Ok(block)
    }

    /// Converts to interchange data, skipping zero entries.
    pub fn to_matrix_data<I: IndexType>(&self) -> Result<MatrixData<V, I>, CgCoreError> {
        let mut data = MatrixData::new((self.rows, self.cols));
        for row in 0..self.rows {
            for col in 0..self.cols {
                let value = self.at(row, col);
                if value != V::zero() {
                    data.nonzeros.push(Triplet::from_usize(row, col, value)?);
                }
            }
        }
        Ok(data)
    }
}

impl<V: ValueType> Matrix for Dense<V> {
    type Value = V;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn from_values_checks_length() {
        let err = Dense::<f64>::from_values(2, 2, vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, CgCoreError::InvalidDimensions(_)));
    }

    #[test]
    fn from_rows_is_row_major() {
        let block = Dense::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(block.values(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(block.at(1, 0), 3.0);
        assert_eq!(block.get(2, 0), None);
    }

    #[test]
    fn copy_from_takes_over_dimensions() {
        let source = Dense::from_values(1, 3, vec![1.0f32, 2.0, 3.0]).unwrap();
        let mut target = Dense::create(&ReferenceDevice, 4, 4);
        target.copy_from(&source);
        assert_eq!(target, source);
    }

    #[test]
    fn compute_dot_conjugates_first_operand() {
        let a = Dense::from_values(2, 1, vec![Complex64::new(0.0, 1.0), Complex64::new(1.0, 0.0)])
            .unwrap();
        let b = Dense::from_values(2, 1, vec![Complex64::new(0.0, 1.0), Complex64::new(2.0, 0.0)])
            .unwrap();
        let mut result = Dense::zeros(1, 1);
        a.compute_dot(&b, &mut result).unwrap();
        assert_eq!(result.at(0, 0), Complex64::new(3.0, 0.0));
    }

    #[test]
    fn compute_dot_is_per_column() {
        let a = Dense::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let mut result = Dense::zeros(2, 1);
        a.compute_dot(&a, &mut result).unwrap();
        assert_eq!(result.values(), &[10.0, 20.0]);
        assert_eq!(a.compute_norm2()[1], 20.0f64.sqrt());

        let mut wrong = Dense::zeros(1, 2);
        assert!(a.compute_dot(&a, &mut wrong).is_err());
    }

    #[test]
    fn matrix_data_skips_zeros() {
        let block = Dense::from_rows(&[vec![0.0, 2.0], vec![3.0, 0.0]]).unwrap();
        let data: MatrixData<f64, i32> = block.to_matrix_data().unwrap();
        assert_eq!(data.nonzeros.len(), 2);
        assert_eq!(Dense::from_matrix_data(&data).unwrap(), block);
    }
}
