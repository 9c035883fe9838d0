use crate::error::CgCoreError;
use crate::value::ValueType;
use std::fmt::Debug;

/// Shape of a sparse matrix or dense block on either backend.
pub trait Matrix: Debug {
    type Value: ValueType;

    /// (rows, columns)
    fn dims(&self) -> (usize, usize);

    fn rows(&self) -> usize {
        self.dims().0
    }

    fn cols(&self) -> usize {
        self.dims().1
    }

    fn is_square(&self) -> bool {
        let (rows, cols) = self.dims();
        rows == cols
    }

    /// Fails with `InvalidDimensions` unless the shape is exactly `rows x cols`.
    /// `name` identifies the operand in the message.
    fn expect_shape(&self, name: &str, rows: usize, cols: usize) -> Result<(), CgCoreError> {
        let (actual_rows, actual_cols) = self.dims();
        if (actual_rows, actual_cols) != (rows, cols) {
            return Err(CgCoreError::InvalidDimensions(format!(
                "{} must be {}x{}, got {}x{}",
                name, rows, cols, actual_rows, actual_cols
            )));
        }
        Ok(())
    }
}
