use cg_core::{CgCoreError, Dense, Device, Matrix, ValueType};
use serde::{Deserialize, Serialize};

pub struct SolveResult<V: ValueType, M> {
    pub x: Dense<V>, // Solution block, one column per right-hand side
    pub metadata: M, // Metadata about the solve process
}

// --- Algorithm Trait Definition ---
/// Trait representing a specific linear system solving algorithm.
/// Generic over the Device (reference/GPU), the Matrix type it supports and
/// the value type of the system.
pub trait SolveAlgorithm<D: Device, M: Matrix<Value = V>, V: ValueType> {
    type Metadata: std::fmt::Debug;

    /// Solves the linear system A X = B for X.
    ///
    /// # Arguments
    ///
    /// * `device` - The execution device (reference or GPU).
    /// * `a` - The coefficient matrix A, resident on `device`.
    /// * `b` - The right-hand side block B; every column is solved independently.
    ///
    /// # Returns
    ///
    /// A `Result` containing the solution block X or a `CgCoreError`.
    fn solve(
        &self,
        device: &D,
        a: &M,
        b: &Dense<V>,
    ) -> impl std::future::Future<Output = Result<SolveResult<V, Self::Metadata>, CgCoreError>>;

    // Helper for input validation, can be called by implementations.
    fn validate_inputs(&self, a: &M, b: &Dense<V>) -> Result<(), CgCoreError> {
        let (rows, cols) = a.dims();
        if !a.is_square() {
            return Err(CgCoreError::InvalidDimensions(format!(
                "Matrix A must be square (dims: {}x{})",
                rows, cols
            )));
        }
        if rows != b.rows() {
            return Err(CgCoreError::InvalidDimensions(format!(
                "Matrix A rows ({}) must match RHS block b rows ({})",
                rows,
                b.rows()
            )));
        }
        Ok(())
    }
}

/// Blocking wrapper around [`SolveAlgorithm::solve`] for native callers.
#[cfg(feature = "native")]
pub fn solve_blocking<A, D, M, V>(
    algorithm: &A,
    device: &D,
    a: &M,
    b: &Dense<V>,
) -> Result<SolveResult<V, A::Metadata>, CgCoreError>
where
    A: SolveAlgorithm<D, M, V>,
    D: Device,
    M: Matrix<Value = V>,
    V: ValueType,
{
    pollster::block_on(algorithm.solve(device, a, b))
}

// --- Algorithm Implementations ---

pub mod block_cg; // Block Conjugate Gradient driver
pub mod cg; // CG kernel stages per backend

pub use block_cg::CgMetadata;

// --- Algorithm Struct Definitions ---

/// Conjugate Gradient Algorithm.
///
/// Can be loaded from configuration; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConjugateGradient {
    /// Relative tolerance on the residual norm of every column.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,      // Default tolerance
            max_iterations: 1000, // Default max iterations
        }
    }
}

impl ConjugateGradient {
    /// Creates a new instance of the Conjugate Gradient algorithm with default parameters.
    pub fn new() -> Self {
        Self::default()
    }
    /// Creates a new instance of the Conjugate Gradient algorithm with specified parameters.
    pub fn with_params(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cg = ConjugateGradient::new();
        assert_eq!(cg.tolerance, 1e-8);
        assert_eq!(cg.max_iterations, 1000);
        assert_eq!(ConjugateGradient::with_params(1e-3, 5).max_iterations, 5);
    }
}
