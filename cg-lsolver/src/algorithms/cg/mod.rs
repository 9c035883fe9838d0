//! Block CG kernel stages and the backend interface the driver runs on.
//!
//! Blocks are `m x n` (one column per right-hand side); per-column scalars
//! are `n x 1` blocks. Stages hold no state between calls.

pub mod gpu;
pub mod reference;

use cg_core::bindings::{self, Operation, PointerMode, Scalar};
use cg_core::{CgCoreError, Csr, CsrGpu, Dense, DenseGpu, Device, GpuDevice, IndexType, Matrix, ReferenceDevice, ValueType};
use std::future::Future;

/// The three CG stages, implemented once per backend.
pub trait CgKernels<V: ValueType>: Device {
    /// Dense block type resident on this backend.
    type Block: Matrix<Value = V>;

    /// `r := b`, `z := p := q := 0`, `prev_rho := 1`, `rho := 0`.
    #[allow(clippy::too_many_arguments)]
    fn initialize(
        &self,
        b: &Self::Block,
        r: &mut Self::Block,
        z: &mut Self::Block,
        p: &mut Self::Block,
        q: &mut Self::Block,
        prev_rho: &mut Self::Block,
        rho: &mut Self::Block,
    ) -> Result<(), CgCoreError>;

    /// `p[:, j] := z[:, j] + (rho[j] / prev_rho[j]) * p[:, j]`, skipping
    /// columns whose `prev_rho` is exactly zero.
    fn step_1(
        &self,
        p: &mut Self::Block,
        z: &Self::Block,
        rho: &Self::Block,
        prev_rho: &Self::Block,
    ) -> Result<(), CgCoreError>;

    /// `x[:, j] += t * p[:, j]`, `r[:, j] -= t * q[:, j]` with
    /// `t = rho[j] / beta[j]`, skipping columns whose `beta` is exactly zero.
    fn step_2(
        &self,
        x: &mut Self::Block,
        r: &mut Self::Block,
        p: &Self::Block,
        q: &Self::Block,
        beta: &Self::Block,
        rho: &Self::Block,
    ) -> Result<(), CgCoreError>;
}

/// Block management the driver needs on top of the stages.
pub trait CgBackend<V: ValueType>: CgKernels<V> {
    /// Zero-filled `rows x cols` block.
    fn create_block(&self, rows: usize, cols: usize) -> Self::Block;

    fn upload(&self, host: &Dense<V>) -> Result<Self::Block, CgCoreError>;

    /// Reads a block back once all work touching it has completed.
    fn download(&self, block: &Self::Block) -> impl Future<Output = Result<Dense<V>, CgCoreError>>;

    fn copy_block(&self, source: &Self::Block, destination: &mut Self::Block) -> Result<(), CgCoreError>;

    /// Per-column `conj(a[:, j]) . b[:, j]` into the `n x 1` block `result`.
    fn dot(&self, a: &Self::Block, b: &Self::Block, result: &mut Self::Block) -> Result<(), CgCoreError>;
}

/// A matrix `M` this backend can multiply blocks with.
pub trait LinearOperator<V: ValueType, M: Matrix<Value = V>>: CgBackend<V> {
    /// `y := alpha * A * x + beta * y`; `y` is not read when `beta` is zero.
    fn apply(&self, alpha: V, a: &M, x: &Self::Block, beta: V, y: &mut Self::Block) -> Result<(), CgCoreError>;
}

/// Rejects blocks that are not `rows x cols`.
pub(crate) fn check_block<B: Matrix>(block: &B, name: &str, rows: usize, cols: usize) -> Result<(), CgCoreError> {
    block.expect_shape(name, rows, cols)
}

// --- Reference backend ---

impl<V: ValueType> CgKernels<V> for ReferenceDevice {
    type Block = Dense<V>;

    fn initialize(
        &self,
        b: &Dense<V>,
        r: &mut Dense<V>,
        z: &mut Dense<V>,
        p: &mut Dense<V>,
        q: &mut Dense<V>,
        prev_rho: &mut Dense<V>,
        rho: &mut Dense<V>,
    ) -> Result<(), CgCoreError> {
        reference::initialize(self, b, r, z, p, q, prev_rho, rho)
    }

    fn step_1(&self, p: &mut Dense<V>, z: &Dense<V>, rho: &Dense<V>, prev_rho: &Dense<V>) -> Result<(), CgCoreError> {
        reference::step_1(self, p, z, rho, prev_rho)
    }

    fn step_2(
        &self,
        x: &mut Dense<V>,
        r: &mut Dense<V>,
        p: &Dense<V>,
        q: &Dense<V>,
        beta: &Dense<V>,
        rho: &Dense<V>,
    ) -> Result<(), CgCoreError> {
        reference::step_2(self, x, r, p, q, beta, rho)
    }
}

impl<V: ValueType> CgBackend<V> for ReferenceDevice {
    fn create_block(&self, rows: usize, cols: usize) -> Dense<V> {
        Dense::create(self, rows, cols)
    }

    fn upload(&self, host: &Dense<V>) -> Result<Dense<V>, CgCoreError> {
        Ok(host.clone())
    }

    fn download(&self, block: &Dense<V>) -> impl Future<Output = Result<Dense<V>, CgCoreError>> {
        futures::future::ready(Ok(block.clone()))
    }

    fn copy_block(&self, source: &Dense<V>, destination: &mut Dense<V>) -> Result<(), CgCoreError> {
        destination.copy_from(source);
        Ok(())
    }

    fn dot(&self, a: &Dense<V>, b: &Dense<V>, result: &mut Dense<V>) -> Result<(), CgCoreError> {
        a.compute_dot(b, result)
    }
}

impl<V: ValueType, I: IndexType> LinearOperator<V, Csr<V, I>> for ReferenceDevice {
    fn apply(&self, alpha: V, a: &Csr<V, I>, x: &Dense<V>, beta: V, y: &mut Dense<V>) -> Result<(), CgCoreError> {
        a.apply(Operation::NonTranspose, alpha, x, beta, y)
    }
}

// --- wgpu backend ---

impl<V: ValueType> CgKernels<V> for GpuDevice {
    type Block = DenseGpu<V>;

    fn initialize(
        &self,
        b: &DenseGpu<V>,
        r: &mut DenseGpu<V>,
        z: &mut DenseGpu<V>,
        p: &mut DenseGpu<V>,
        q: &mut DenseGpu<V>,
        prev_rho: &mut DenseGpu<V>,
        rho: &mut DenseGpu<V>,
    ) -> Result<(), CgCoreError> {
        gpu::initialize(self, b, r, z, p, q, prev_rho, rho)
    }

    fn step_1(
        &self,
        p: &mut DenseGpu<V>,
        z: &DenseGpu<V>,
        rho: &DenseGpu<V>,
        prev_rho: &DenseGpu<V>,
    ) -> Result<(), CgCoreError> {
        gpu::step_1(self, p, z, rho, prev_rho)
    }

    fn step_2(
        &self,
        x: &mut DenseGpu<V>,
        r: &mut DenseGpu<V>,
        p: &DenseGpu<V>,
        q: &DenseGpu<V>,
        beta: &DenseGpu<V>,
        rho: &DenseGpu<V>,
    ) -> Result<(), CgCoreError> {
        gpu::step_2(self, x, r, p, q, beta, rho)
    }
}

impl<V: ValueType> CgBackend<V> for GpuDevice {
    fn create_block(&self, rows: usize, cols: usize) -> DenseGpu<V> {
        self.create_dense(rows, cols)
    }

    fn upload(&self, host: &Dense<V>) -> Result<DenseGpu<V>, CgCoreError> {
        Ok(self.upload_dense(host))
    }

    fn download(&self, block: &DenseGpu<V>) -> impl Future<Output = Result<Dense<V>, CgCoreError>> {
        block.to_dense()
    }

    fn copy_block(&self, source: &DenseGpu<V>, destination: &mut DenseGpu<V>) -> Result<(), CgCoreError> {
        self.copy(source, destination)
    }

    fn dot(&self, a: &DenseGpu<V>, b: &DenseGpu<V>, result: &mut DenseGpu<V>) -> Result<(), CgCoreError> {
        self.compute_dot(a, b, result)
    }
}

impl<V: ValueType, I: IndexType> LinearOperator<V, CsrGpu<V, I>> for GpuDevice {
    fn apply(
        &self,
        alpha: V,
        a: &CsrGpu<V, I>,
        x: &DenseGpu<V>,
        beta: V,
        y: &mut DenseGpu<V>,
    ) -> Result<(), CgCoreError> {
        let handle = self.sparse_handle();
        match handle.pointer_mode() {
            PointerMode::Host => bindings::spmv(
                handle,
                Operation::NonTranspose,
                Scalar::Host(alpha),
                a.descriptor(),
                a,
                x,
                Scalar::Host(beta),
                y,
            ),
            PointerMode::Device => {
                let alpha = self.upload_dense(&Dense::from_values(1, 1, vec![alpha])?);
                let beta = self.upload_dense(&Dense::from_values(1, 1, vec![beta])?);
                bindings::spmv(
                    handle,
                    Operation::NonTranspose,
                    Scalar::Device(&alpha),
                    a.descriptor(),
                    a,
                    x,
                    Scalar::Device(&beta),
                    y,
                )
            }
        }
    }
}
